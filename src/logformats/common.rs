use regex::Regex;

use crate::{error::JobError, mr::LogFormat};

// IP ident user [date] "request" status size, anything after is ignored
const PATTERN: &str = r#"^\S+ \S+ \S+ \[[^\]]+\] "[^"]*" (?P<status>\d{3}) (?:\d+|-)(?:\s|$)"#;

/// NCSA common log format. Combined-format lines match as well.
pub struct Common {
    re: Regex,
}

impl Common {
    pub fn new() -> Result<Self, JobError> {
        Ok(Common {
            re: super::compile(PATTERN)?,
        })
    }
}

impl LogFormat for Common {
    fn name(&self) -> &'static str {
        "common"
    }

    fn status_code<'a>(&self, line: &'a str) -> Option<&'a str> {
        Some(self.re.captures(line)?.name("status")?.as_str())
    }
}
