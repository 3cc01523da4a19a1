use warden_types::CheckName;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("check {0} is not known to this engine")]
    UnknownCheck(CheckName),
}

pub type CheckResult<T> = Result<T, CheckError>;
