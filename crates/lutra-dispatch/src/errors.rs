// errors.rs
//! Dispatch-table construction errors.
//!
//! Every variant is a compiler fault, not a user error: the inputs come
//! from earlier compilation phases, so a failure here means one of them
//! broke its contract. Callers abort the compilation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Two targets merged into one selector disagree on setter-ness.
    #[error("selector {selector} merges a setter target with a non-setter target ({member})")]
    SetterDisagreement { selector: u32, member: String },

    /// A reachable member has no front-end dispatch attributes.
    #[error("no dispatch metadata for member {member}")]
    MissingMetadata { member: String },

    /// `selector_for_target` on a reference whose selector was never
    /// created during the hierarchy walk.
    #[error("no selector created for target {member}")]
    UnknownSelector { member: String },

    /// Emission found no compiled function for a target homed in a
    /// loaded module. Missing functions are permitted only for deferred
    /// modules, whose table slots stay empty until they load.
    #[error("no compiled function for {member} in loaded module {module}")]
    UnresolvedTarget { member: String, module: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = DispatchError::MissingMetadata {
            member: "Point.translate".to_string(),
        };
        assert_eq!(err.to_string(), "no dispatch metadata for member Point.translate");

        let err = DispatchError::UnresolvedTarget {
            member: "Shape.area".to_string(),
            module: "main".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no compiled function for Shape.area in loaded module main"
        );
    }
}
