/// Return this error from an executor to abort the whole run.
///
/// Any other error returned for an attempt is counted as a failed attempt and the workers carry on.
/// This one is for problems that make further attempts pointless, such as a broken configuration.
/// The run is marked as failed and every worker stops.
#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("{msg}")]
pub struct RunAbortError {
    msg: String,
}

impl RunAbortError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for RunAbortError {
    fn default() -> Self {
        Self {
            msg: "Run aborted".to_string(),
        }
    }
}
