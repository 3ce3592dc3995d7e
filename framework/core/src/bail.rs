/// Return this error from a virtual user's behaviour to indicate that the virtual user is bailing.
///
/// The iteration that returned it is recorded as a failure and the virtual user then stops running
/// its behaviour for the rest of the run. Other virtual users are not affected. Use this when a
/// virtual user hits a problem that it cannot recover from, like a client that can no longer reach
/// the target, but the run as a whole should carry on.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VirtualUserBailError {
    msg: String,
}

impl VirtualUserBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VirtualUserBailError {
    fn default() -> Self {
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bail_error_is_recognisable_through_anyhow() {
        let err: anyhow::Error = VirtualUserBailError::new("target gone").into();

        assert!(err.is::<VirtualUserBailError>());
        assert_eq!("target gone", err.to_string());
    }
}
