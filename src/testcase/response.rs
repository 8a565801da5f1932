//! Table values and reply encoding for MMI answers.
//!
//! Per-wid tables hold a [`WidValue`]; generic handlers and table
//! callbacks produce a [`WidReply`], which [`encode_reply`] turns into the
//! string the verdict engine expects for the prompt's style.

use std::fmt;
use std::sync::Arc;

use super::mmi::MmiStyle;

/// Callback receiving the prompt description.
pub type DescriptionFn = Arc<dyn Fn(&str) -> WidReply + Send + Sync + 'static>;

/// Callback receiving the prompt description and fixed extra arguments.
pub type DescriptionArgsFn = Arc<dyn Fn(&str, &[String]) -> WidReply + Send + Sync + 'static>;

/// Value produced for a prompt before style encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidReply {
    /// Free text; non-empty text is truthy.
    Text(String),
    Bool(bool),
    /// No value (maps to `Cancel` for three-way prompts).
    Unset,
    /// Answer later from the pending response source.
    Wait,
}

impl WidReply {
    pub fn text(value: impl Into<String>) -> Self {
        WidReply::Text(value.into())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            WidReply::Text(text) => !text.is_empty(),
            WidReply::Bool(value) => *value,
            WidReply::Unset | WidReply::Wait => false,
        }
    }
}

impl From<bool> for WidReply {
    fn from(value: bool) -> Self {
        WidReply::Bool(value)
    }
}

impl From<String> for WidReply {
    fn from(value: String) -> Self {
        WidReply::Text(value)
    }
}

impl From<&str> for WidReply {
    fn from(value: &str) -> Self {
        WidReply::Text(value.to_string())
    }
}

impl<T: Into<WidReply>> From<Option<T>> for WidReply {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(WidReply::Unset)
    }
}

/// Encode a reply for a prompt style.
///
/// `Wait` must be resolved by the caller; here it encodes like `Unset`.
pub fn encode_reply(style: MmiStyle, reply: &WidReply) -> String {
    let answer = match style {
        MmiStyle::Edit1 | MmiStyle::Edit2 => {
            return match reply {
                WidReply::Text(text) => text.clone(),
                WidReply::Bool(true) => "True".to_string(),
                WidReply::Bool(false) => "False".to_string(),
                WidReply::Unset | WidReply::Wait => String::new(),
            };
        }
        MmiStyle::OkCancel1 | MmiStyle::OkCancel2 => {
            if reply.is_truthy() {
                "OK"
            } else {
                "Cancel"
            }
        }
        MmiStyle::YesNo1 => {
            if reply.is_truthy() {
                "Yes"
            } else {
                "No"
            }
        }
        MmiStyle::YesNoCancel1 => match reply {
            WidReply::Unset | WidReply::Wait => "Cancel",
            r if r.is_truthy() => "Yes",
            _ => "No",
        },
        MmiStyle::Ok1 => "Ok",
        MmiStyle::AbortRetry1 => {
            if reply.is_truthy() {
                "Retry"
            } else {
                "Abort"
            }
        }
    };
    answer.to_string()
}

/// Entry in a per-wid answer table.
#[derive(Clone)]
pub enum WidValue {
    /// Fixed answer; in the verify table, a single required substring.
    Literal(String),
    /// Callback invoked with the prompt description.
    Predicate(DescriptionFn),
    /// Callback invoked with the description and these extra arguments.
    PredicateWithArgs(DescriptionArgsFn, Vec<String>),
    /// All of these must appear, case-insensitively, in the description.
    RequiredSubstrings(Vec<String>),
}

impl WidValue {
    pub fn literal(value: impl Into<String>) -> Self {
        WidValue::Literal(value.into())
    }

    pub fn predicate<F, R>(f: F) -> Self
    where
        F: Fn(&str) -> R + Send + Sync + 'static,
        R: Into<WidReply>,
    {
        WidValue::Predicate(Arc::new(move |description: &str| -> WidReply {
            f(description).into()
        }))
    }

    pub fn predicate_with_args<F, R, I, S>(f: F, args: I) -> Self
    where
        F: Fn(&str, &[String]) -> R + Send + Sync + 'static,
        R: Into<WidReply>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WidValue::PredicateWithArgs(
            Arc::new(move |description: &str, args: &[String]| -> WidReply {
                f(description, args).into()
            }),
            args.into_iter().map(Into::into).collect(),
        )
    }

    pub fn substrings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WidValue::RequiredSubstrings(items.into_iter().map(Into::into).collect())
    }

    /// Evaluate the entry against a prompt description.
    pub fn resolve(&self, description: &str) -> WidReply {
        match self {
            WidValue::Literal(value) => WidReply::Text(value.clone()),
            WidValue::Predicate(f) => f(description),
            WidValue::PredicateWithArgs(f, args) => f(description, args),
            WidValue::RequiredSubstrings(items) => {
                WidReply::Bool(contains_all(description, items))
            }
        }
    }

    /// Verification outcome: substrings are checked, callbacks judged by
    /// truthiness.
    pub fn verify(&self, description: &str) -> bool {
        match self {
            WidValue::Literal(value) => contains_all(description, std::slice::from_ref(value)),
            other => other.resolve(description).is_truthy(),
        }
    }
}

impl fmt::Debug for WidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            WidValue::Predicate(_) => f.write_str("Predicate(..)"),
            WidValue::PredicateWithArgs(_, args) => {
                f.debug_tuple("PredicateWithArgs").field(args).finish()
            }
            WidValue::RequiredSubstrings(items) => {
                f.debug_tuple("RequiredSubstrings").field(items).finish()
            }
        }
    }
}

impl From<&str> for WidValue {
    fn from(value: &str) -> Self {
        WidValue::literal(value)
    }
}

impl From<String> for WidValue {
    fn from(value: String) -> Self {
        WidValue::Literal(value)
    }
}

fn contains_all(description: &str, items: &[String]) -> bool {
    let haystack = description.to_lowercase();
    items
        .iter()
        .all(|item| haystack.contains(&item.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_boolean_styles() {
        let yes = WidReply::Bool(true);
        let no = WidReply::Bool(false);

        assert_eq!(encode_reply(MmiStyle::OkCancel1, &yes), "OK");
        assert_eq!(encode_reply(MmiStyle::OkCancel2, &no), "Cancel");
        assert_eq!(encode_reply(MmiStyle::YesNo1, &yes), "Yes");
        assert_eq!(encode_reply(MmiStyle::YesNo1, &no), "No");
        assert_eq!(encode_reply(MmiStyle::AbortRetry1, &yes), "Retry");
        assert_eq!(encode_reply(MmiStyle::AbortRetry1, &no), "Abort");
        assert_eq!(encode_reply(MmiStyle::Ok1, &no), "Ok");
    }

    #[test]
    fn test_encode_three_way() {
        assert_eq!(encode_reply(MmiStyle::YesNoCancel1, &WidReply::Bool(true)), "Yes");
        assert_eq!(encode_reply(MmiStyle::YesNoCancel1, &WidReply::Bool(false)), "No");
        assert_eq!(encode_reply(MmiStyle::YesNoCancel1, &WidReply::Unset), "Cancel");
        assert_eq!(encode_reply(MmiStyle::YesNoCancel1, &WidReply::text("")), "No");
    }

    #[test]
    fn test_encode_edit_stringifies() {
        assert_eq!(encode_reply(MmiStyle::Edit1, &WidReply::text("123456")), "123456");
        assert_eq!(encode_reply(MmiStyle::Edit2, &WidReply::Bool(true)), "True");
        assert_eq!(encode_reply(MmiStyle::Edit1, &WidReply::Unset), "");
    }

    #[test]
    fn test_truthiness() {
        assert!(WidReply::text("x").is_truthy());
        assert!(!WidReply::text("").is_truthy());
        assert!(!WidReply::Unset.is_truthy());
        assert!(!WidReply::Wait.is_truthy());
        assert_eq!(WidReply::from(None::<bool>), WidReply::Unset);
        assert_eq!(WidReply::from(Some("a")), WidReply::text("a"));
    }

    #[test]
    fn test_required_substrings_case_insensitive() {
        let value = WidValue::substrings(["ABC", "DEF"]);
        assert!(value.verify("value is abc then Def"));
        assert!(!value.verify("value is abc only"));
    }

    #[test]
    fn test_literal_verifies_as_substring() {
        let value = WidValue::literal("0x0001");
        assert!(value.verify("Handle 0X0001 written"));
        assert!(!value.verify("Handle 0x0002 written"));
        assert_eq!(value.resolve("anything"), WidReply::text("0x0001"));
    }

    #[test]
    fn test_predicates() {
        let plain = WidValue::predicate(|d: &str| d.len() > 3);
        assert!(plain.verify("long"));
        assert!(!plain.verify("no"));

        let with_args = WidValue::predicate_with_args(
            |d: &str, args: &[String]| format!("{}:{}", d, args.join(",")),
            ["a", "b"],
        );
        assert_eq!(with_args.resolve("d"), WidReply::text("d:a,b"));
    }
}
