use nix::unistd::getuid;
use std::collections::HashMap;
use std::env as stdenv;

/// Names the lexer is allowed to substitute; any other `$name` expands to nothing.
pub const SUBSTITUTED_VARIABLES: [&str; 4] = ["HOME", "SHELL", "USER", "EUID"];

/// Variables visible to `$name` substitution.
///
/// The environment is a snapshot of the process environment taken when the
/// session starts. Fields are public so tests can build one by hand.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Key-value store of environment variables (e.g. HOME, USER).
    pub vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn new() -> Self {
        Self {
            vars: stdenv::vars().collect(),
        }
    }

    /// Get the value of a variable from the snapshot.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable in the snapshot.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Value a `$name` reference expands to.
    ///
    /// `EUID` is the numeric user id of the running process. Other allowed
    /// names come from the snapshot and expand to nothing when unset; names
    /// outside [`SUBSTITUTED_VARIABLES`] always expand to nothing.
    pub fn substitute(&self, name: &str) -> String {
        match name {
            "EUID" => getuid().to_string(),
            _ if SUBSTITUTED_VARIABLES.contains(&name) => {
                self.get_var(name).unwrap_or_default().to_string()
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use nix::unistd::getuid;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::default();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE"));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn substitution_is_limited_to_allow_list() {
        let mut env = Environment::default();
        env.set_var("HOME", "/home/ann");
        env.set_var("PATH", "/bin");
        assert_eq!(env.substitute("HOME"), "/home/ann");
        assert_eq!(env.substitute("PATH"), "");
        assert_eq!(env.substitute("SHELL"), "");
    }

    #[test]
    fn euid_is_the_process_user_id() {
        let mut env = Environment::default();
        env.set_var("EUID", "not-used");
        assert_eq!(env.substitute("EUID"), getuid().as_raw().to_string());
    }
}
