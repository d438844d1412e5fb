use std::fmt;

/// Terminal outcome of a workflow. Each variant maps to its own process exit
/// code so scripts can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Success,
    /// Unrecoverable run failure (exhausted transport retries, interrupted
    /// run, unavailable report).
    Failed,
    /// Settings rejected before any remote mutation.
    InvalidSettings,
    NoFieldsFound,
    NoRecordsFound,
    NoFilesFound,
}

impl ProcessStatus {
    pub fn code(self) -> u8 {
        match self {
            ProcessStatus::Success => 0,
            ProcessStatus::Failed => 1,
            ProcessStatus::InvalidSettings => 2,
            ProcessStatus::NoFieldsFound => 3,
            ProcessStatus::NoRecordsFound => 4,
            ProcessStatus::NoFilesFound => 5,
        }
    }

    pub fn is_success(self) -> bool {
        self == ProcessStatus::Success
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProcessStatus::Success => "success",
            ProcessStatus::Failed => "failed",
            ProcessStatus::InvalidSettings => "invalid settings",
            ProcessStatus::NoFieldsFound => "no fields found",
            ProcessStatus::NoRecordsFound => "no records found",
            ProcessStatus::NoFilesFound => "no files found",
        };
        f.write_str(text)
    }
}
