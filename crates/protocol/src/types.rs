use serde::{Deserialize, Serialize};

/// Caller-facing failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No input file was selected.
    NoFile,
    /// A request exceeded its deadline.
    TimedOut,
    /// Anything else: rejected blocks, rejected merge, read errors.
    Fail,
}

impl ErrorCode {
    /// Numeric code as exposed to callers.
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::NoFile => 0,
            ErrorCode::TimedOut => 1,
            ErrorCode::Fail => 2,
        }
    }

    /// Short message paired with the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::NoFile => "no file",
            ErrorCode::TimedOut => "time out",
            ErrorCode::Fail => "fail",
        }
    }
}

/// `{message, errCode}` rejection shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub message: String,
    #[serde(rename = "errCode")]
    pub err_code: u8,
}

impl From<ErrorCode> for Rejection {
    fn from(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            err_code: code.code(),
        }
    }
}
