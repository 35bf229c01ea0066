//! Error types for stack declaration and synthesis.
//!
//! Every variant is a static failure: it is detected while the stack is
//! being declared or synthesized, before any provisioning happens. Each
//! carries the ids, attribute names or cycle path needed to fix the
//! declaration.

use thiserror::Error;

/// Errors that can occur while declaring or synthesizing a stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A caller-supplied resource id is already taken in this stack
    #[error("duplicate resource id: {id}")]
    DuplicateId {
        /// The colliding id
        id: String,
    },

    /// An operation named a resource that was never declared
    #[error("unknown resource: {id}")]
    UnknownNode {
        /// The id that was not found
        id: String,
    },

    /// A reference or explicit dependency names a resource that does not exist
    #[error("{}", describe_unresolved(.node, .target, .attribute.as_deref()))]
    UnresolvedReference {
        /// The node (or `output.<name>`, `backend`, `provider.<name>`) holding the reference
        node: String,
        /// The missing resource id
        target: String,
        /// The attribute being read, `None` for an explicit `depends_on` entry
        attribute: Option<String>,
    },

    /// The dependency graph contains a cycle
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Ids along the cycle, starting and ending with the same id
        cycle: Vec<String>,
    },

    /// An output name was declared twice
    #[error("duplicate output: {name}")]
    DuplicateOutput {
        /// The repeated output name
        name: String,
    },

    /// An id, external name or output name is malformed
    #[error("invalid identifier '{id}': {reason}")]
    InvalidId {
        /// The rejected identifier
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Two resources of the same kind would share an external name
    #[error("address '{name}' is used by both '{first}' and '{second}'")]
    DuplicateExternalName {
        /// The shared address, `kind.external_name`
        name: String,
        /// First resource id using it (construction order)
        first: String,
        /// Second resource id using it
        second: String,
    },

    /// A `${...}` interpolation could not be parsed
    #[error("invalid interpolation in '{input}': {reason}")]
    InvalidInterpolation {
        /// The full input string
        input: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

fn describe_unresolved(node: &str, target: &str, attribute: Option<&str>) -> String {
    match attribute {
        Some(attr) => format!("{node}: reference '{target}.{attr}' names unknown resource '{target}'"),
        None => format!("{node}: depends_on names unknown resource '{target}'"),
    }
}

/// Result type for declaration and synthesis operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_unresolved_message_names_target() {
        let err = Error::UnresolvedReference {
            node: "app".into(),
            target: "env".into(),
            attribute: Some("id".into()),
        };
        assert_eq!(
            err.to_string(),
            "app: reference 'env.id' names unknown resource 'env'"
        );

        let err = Error::UnresolvedReference {
            node: "app".into(),
            target: "rg".into(),
            attribute: None,
        };
        assert!(err.to_string().contains("depends_on"));
    }
}
