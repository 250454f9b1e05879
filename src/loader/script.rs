//! Script execution.
//!
//! Script requirements are handed to a [`ScriptHost`] exactly once per URL.
//! [`ScriptRegistry`] maps URLs to native installers, which typically
//! register behaviors or data the templates refer to.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::Result;

pub trait ScriptHost {
    fn execute(&mut self, url: &str, source: &str) -> Result<()>;
}

/// Installer run when the script at its URL executes. Receives the body.
pub type Installer = Box<dyn FnMut(&str) -> Result<()>>;

#[derive(Default)]
pub struct ScriptRegistry {
    installers: HashMap<String, Installer>,
    executed: Vec<String>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, url: impl Into<String>, installer: F)
    where
        F: FnMut(&str) -> Result<()> + 'static,
    {
        self.installers.insert(url.into(), Box::new(installer));
    }

    pub fn with<F>(mut self, url: impl Into<String>, installer: F) -> Self
    where
        F: FnMut(&str) -> Result<()> + 'static,
    {
        self.register(url, installer);
        self
    }

    /// URLs executed so far, in execution order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl ScriptHost for ScriptRegistry {
    fn execute(&mut self, url: &str, source: &str) -> Result<()> {
        self.executed.push(url.to_string());
        match self.installers.get_mut(url) {
            Some(install) => install(source),
            None => {
                debug!(url, "no installer for script");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("installers", &self.installers.len())
            .field("executed", &self.executed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CogError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_installer_receives_source() {
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        let mut scripts = ScriptRegistry::new().with("/lib.js", move |src: &str| {
            sink.borrow_mut().push_str(src);
            Ok(())
        });

        scripts.execute("/lib.js", "body").unwrap();
        scripts.execute("/other.js", "").unwrap();
        assert_eq!(*seen.borrow(), "body");
        assert_eq!(scripts.executed(), ["/lib.js", "/other.js"]);
    }

    #[test]
    fn test_installer_error_propagates() {
        let mut scripts = ScriptRegistry::new().with("/bad.js", |_: &str| {
            Err(CogError::Script {
                url: "/bad.js".into(),
                message: "boom".into(),
            })
        });
        assert!(scripts.execute("/bad.js", "").is_err());
    }
}
