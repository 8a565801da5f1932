//! MMI prompts as delivered by the verdict engine.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::BtpError;

/// Prompt style; decides how a response is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmiStyle {
    OkCancel1,
    OkCancel2,
    Ok1,
    YesNo1,
    YesNoCancel1,
    AbortRetry1,
    Edit1,
    Edit2,
}

impl MmiStyle {
    /// Numeric style code used by the verdict engine.
    pub fn code(self) -> u32 {
        match self {
            MmiStyle::OkCancel1 => 0x11041,
            MmiStyle::OkCancel2 => 0x11141,
            MmiStyle::Ok1 => 0x11040,
            MmiStyle::YesNo1 => 0x11044,
            MmiStyle::YesNoCancel1 => 0x11043,
            MmiStyle::AbortRetry1 => 0x11042,
            MmiStyle::Edit1 => 0x12040,
            MmiStyle::Edit2 => 0x12140,
        }
    }
}

impl TryFrom<u32> for MmiStyle {
    type Error = BtpError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            0x11041 => MmiStyle::OkCancel1,
            0x11141 => MmiStyle::OkCancel2,
            0x11040 => MmiStyle::Ok1,
            0x11044 => MmiStyle::YesNo1,
            0x11043 => MmiStyle::YesNoCancel1,
            0x11042 => MmiStyle::AbortRetry1,
            0x12040 => MmiStyle::Edit1,
            0x12140 => MmiStyle::Edit2,
            other => return Err(BtpError::UnknownStyle(other)),
        })
    }
}

impl fmt::Display for MmiStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MmiStyle::OkCancel1 => "Ok_Cancel1",
            MmiStyle::OkCancel2 => "Ok_Cancel2",
            MmiStyle::Ok1 => "Ok1",
            MmiStyle::YesNo1 => "Yes_No1",
            MmiStyle::YesNoCancel1 => "Yes_No_Cancel1",
            MmiStyle::AbortRetry1 => "Abort_Retry1",
            MmiStyle::Edit1 => "Edit1",
            MmiStyle::Edit2 => "Edit2",
        };
        f.write_str(name)
    }
}

/// One interactive prompt from the verdict engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmiPrompt {
    pub project: String,
    pub wid: u32,
    pub test_case: String,
    pub description: String,
    pub style: MmiStyle,
}

impl MmiPrompt {
    pub fn new(
        project: impl Into<String>,
        wid: u32,
        test_case: impl Into<String>,
        description: impl Into<String>,
        style: MmiStyle,
    ) -> Self {
        Self {
            project: project.into(),
            wid,
            test_case: test_case.into(),
            description: description.into(),
            style,
        }
    }

    /// Tokens extracted from the description, see [`parse_mmi_args`].
    pub fn args(&self) -> Vec<String> {
        parse_mmi_args(&self.description)
    }
}

fn args_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"'((?:0[xX])?[0-9A-Fa-f]+)'"#,
            r#"|"((?:0[xX])?[0-9A-Fa-f]+)""#,
            r#"|=\s*(0[xX][0-9A-Fa-f]+|[0-9][0-9A-Fa-f]*)\b"#,
        ))
        .expect("static MMI argument pattern")
    })
}

/// Extract argument tokens from a prompt description, left to right.
///
/// A token is a numeric/hex value, either quoted (single or double quotes)
/// or following an `=` sign. Quoted words such as button labels are not
/// tokens. After `=` the value must start with a digit or `0x`.
///
/// ```
/// use btp_harness::testcase::parse_mmi_args;
///
/// let args = parse_mmi_args("Click 'OK', write '00A3' to handle = 0x00A3, offset = 4");
/// assert_eq!(args, vec!["00A3", "0x00A3", "4"]);
/// ```
pub fn parse_mmi_args(description: &str) -> Vec<String> {
    args_regex()
        .captures_iter(description)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}
