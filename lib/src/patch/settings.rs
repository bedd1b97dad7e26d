use super::{Environment, Error};
use crate::jvm::{BinaryName, Name, UnqualifiedName};

/// What to do with a class when one of its patches can't be applied
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep going: the class is emitted without the failed patch (or entirely unpatched)
    FailOpen,

    /// Abort: the error is returned to the host
    FailClosed,
}

pub struct Settings {
    /// Policy for missing patch targets and rejected classes
    pub failure_policy: FailurePolicy,

    /// Naming used by the binary being patched
    pub environment: Environment,

    /// Class holding the static boolean configuration flags read by patched code
    pub config_class: BinaryName,

    /// Package of the hook classes called by patched code (eg. `GuiPlayerTabOverlayHook`)
    pub hooks_package: BinaryName,

    /// Main class of the mod, holding the `instance` singleton
    pub main_class: BinaryName,

    /// Replacement cloud renderer, obtained from the main class
    pub cloud_handler_class: BinaryName,

    /// Name of the class attribute listing the rules applied to a class
    ///
    /// Classes already carrying this attribute are not patched again.
    pub marker_attribute: UnqualifiedName,
}

impl Settings {
    pub fn new(failure_policy: FailurePolicy, environment: Environment) -> Result<Settings, Error> {
        fn make_name<N: Name>(name: impl Into<String>) -> Result<N, Error> {
            N::from_string(name.into()).map_err(Error::MalformedName)
        }

        Ok(Settings {
            failure_policy,
            environment,
            config_class: make_name("club/sk1er/patcher/config/PatcherConfig")?,
            hooks_package: make_name("club/sk1er/patcher/hooks")?,
            main_class: make_name("club/sk1er/patcher/Patcher")?,
            cloud_handler_class: make_name("club/sk1er/patcher/util/world/cloud/CloudHandler")?,
            marker_attribute: make_name("ClassPatchRules")?,
        })
    }

    /// Hook class in the hooks package
    pub fn hook_class(&self, simple_name: &str) -> Result<BinaryName, Error> {
        let simple_name =
            UnqualifiedName::from_string(simple_name.to_owned()).map_err(Error::MalformedName)?;
        Ok(self.hooks_package.join(simple_name))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hook_classes() {
        let settings = Settings::new(FailurePolicy::FailOpen, Environment::Obfuscated).unwrap();
        assert_eq!(
            settings.hook_class("GuiPlayerTabOverlayHook").unwrap().as_str(),
            "club/sk1er/patcher/hooks/GuiPlayerTabOverlayHook"
        );
        assert!(matches!(
            settings.hook_class("a/B"),
            Err(Error::MalformedName(_))
        ));
    }
}
