//! `-e key=value` extra variables.

use secrecy::{ExposeSecret, SecretString};

use crate::args::{ArgumentList, quote_if_spaced};
use crate::expand::EnvVars;

/// One extra variable. The value is held as a secret; whether it is shown
/// in rendered command lines is decided by `hidden`.
#[derive(Debug)]
pub struct ExtraVar {
    pub key: String,
    pub value: SecretString,
    pub hidden: bool,
}

impl ExtraVar {
    pub fn new(key: impl Into<String>, value: &str, hidden: bool) -> Self {
        Self {
            key: key.into(),
            value: SecretString::from(value),
            hidden,
        }
    }

    pub fn visible(key: impl Into<String>, value: &str) -> Self {
        Self::new(key, value, false)
    }

    pub fn hidden(key: impl Into<String>, value: &str) -> Self {
        Self::new(key, value, true)
    }

    /// Append `-e key=value`, masking the pair when hidden.
    pub fn add_argument(&self, args: &mut ArgumentList, env: &EnvVars) {
        let pair = format!(
            "{}={}",
            env.expand(&self.key),
            quote_if_spaced(&env.expand(self.value.expose_secret()))
        );
        args.add("-e");
        if self.hidden {
            args.add_masked(pair);
        } else {
            args.add(pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_and_hidden() {
        let env = EnvVars::new();
        let mut args = ArgumentList::new();
        ExtraVar::visible("foo", "bar").add_argument(&mut args, &env);
        ExtraVar::hidden("token", "abc123").add_argument(&mut args, &env);
        assert_eq!(args.to_command_line(), "-e foo=bar -e ******");
        assert_eq!(args.to_vec()[3], "token=abc123");
    }

    #[test]
    fn test_spaced_value_quoted_and_expanded() {
        let env: EnvVars = [("WHO", "big world")].into_iter().collect();
        let mut args = ArgumentList::new();
        ExtraVar::visible("greeting", "hello ${WHO}").add_argument(&mut args, &env);
        assert_eq!(args.to_vec(), vec!["-e", "greeting=\"hello big world\""]);
    }

    #[test]
    fn test_debug_hides_value() {
        let var = ExtraVar::visible("password", "hunter2");
        assert!(!format!("{:?}", var).contains("hunter2"));
    }
}
