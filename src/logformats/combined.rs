use regex::Regex;

use crate::{error::JobError, mr::LogFormat};

// IP ident user [date] "request" status size "referrer" "agent"
const PATTERN: &str = r#"^\S+ \S+ \S+ \[[^\]]+\] "[^"]*" (?P<status>\d{3}) (?:\d+|-) "[^"]*" "[^"]*""#;

/// Combined log format, the default layout of Apache and nginx access logs.
pub struct Combined {
    re: Regex,
}

impl Combined {
    pub fn new() -> Result<Self, JobError> {
        Ok(Combined {
            re: super::compile(PATTERN)?,
        })
    }
}

impl LogFormat for Combined {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn status_code<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.re
            .captures(line)
            .and_then(|caps| caps.name("status"))
            .map(|m| m.as_str())
    }
}
