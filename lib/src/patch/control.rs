use super::Error;
use log::{debug, info};
use std::collections::BTreeMap;

/// Host runtime switches read by patched code
pub trait FeatureFlags {
    fn get(&self, flag: &str) -> Option<bool>;
    fn set(&mut self, flag: &str, value: bool);
}

/// In-memory [`FeatureFlags`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: BTreeMap<String, bool>,
}

impl FlagSet {
    pub fn new() -> FlagSet {
        FlagSet::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.flags.iter().map(|(flag, value)| (flag.as_str(), *value))
    }
}

impl FeatureFlags for FlagSet {
    fn get(&self, flag: &str) -> Option<bool> {
        self.flags.get(flag).copied()
    }

    fn set(&mut self, flag: &str, value: bool) {
        self.flags.insert(flag.to_owned(), value);
    }
}

/// Flags switched together by [`toggle_feature_set`]
pub const OPTIMIZATION_FLAGS: [&str; 14] = [
    "cullParticles",
    "entityCulling",
    "searchingOptimizationFix",
    "entitySightCulling",
    "fullbright",
    "disableConstantFogColorChecking",
    "lowAnimationTick",
    "staticParticleColor",
    "optimizedFontRenderer",
    "cacheFontData",
    "removeCloudTransparency",
    "gpuCloudRenderer",
    "glErrorChecking",
    "optimizedItemRenderer",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FeatureSet {
    /// Every optimization off
    Vanilla,

    /// Every optimization on
    Optimized,
}

/// Switch all of the optimization flags at once
pub fn toggle_feature_set(flags: &mut dyn FeatureFlags, feature_set: FeatureSet) {
    let value = feature_set == FeatureSet::Optimized;
    for flag in OPTIMIZATION_FLAGS {
        flags.set(flag, value);
    }
    info!("Switched to the {:?} feature set", feature_set);
}

/// Something holding render state that can go stale
pub trait Enhancement: Send {
    fn name(&self) -> &str;

    /// Drop every cached entry
    fn invalidate_all(&mut self);
}

/// Enhancements, by name
#[derive(Default)]
pub struct EnhancementRegistry {
    enhancements: BTreeMap<String, Box<dyn Enhancement>>,
}

impl EnhancementRegistry {
    pub fn new() -> EnhancementRegistry {
        EnhancementRegistry::default()
    }

    /// Register an enhancement, replacing any other with the same name
    pub fn register(&mut self, enhancement: Box<dyn Enhancement>) {
        let name = enhancement.name().to_owned();
        debug!("Registered enhancement {}", name);
        self.enhancements.insert(name, enhancement);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.enhancements.keys().map(String::as_str)
    }

    /// Invalidate the cached state of one enhancement
    pub fn invalidate(&mut self, name: &str) -> Result<(), Error> {
        let enhancement = self
            .enhancements
            .get_mut(name)
            .ok_or_else(|| Error::UnknownEnhancement(name.to_owned()))?;
        enhancement.invalidate_all();
        debug!("Invalidated {}", name);
        Ok(())
    }

    pub fn invalidate_all(&mut self) {
        for enhancement in self.enhancements.values_mut() {
            enhancement.invalidate_all();
        }
        debug!("Invalidated {} enhancements", self.enhancements.len());
    }
}

/// Enhancements cleared by [`reset_caches`]
pub const RENDERER_ENHANCEMENTS: [&str; 2] = ["EnhancedFontRenderer", "EnhancedItemRenderer"];

/// Clear the font and item renderer caches
pub fn reset_caches(registry: &mut EnhancementRegistry) -> Result<(), Error> {
    for name in RENDERER_ENHANCEMENTS {
        registry.invalidate(name)?;
    }
    info!("Cleared renderer caches");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        name: &'static str,
        invalidations: Arc<AtomicUsize>,
    }

    impl Enhancement for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn invalidate_all(&mut self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(registry: &mut EnhancementRegistry, name: &'static str) -> Arc<AtomicUsize> {
        let invalidations = Arc::new(AtomicUsize::new(0));
        registry.register(Box::new(Counting {
            name,
            invalidations: invalidations.clone(),
        }));
        invalidations
    }

    #[test]
    fn feature_sets() {
        let mut flags = FlagSet::new();
        flags.set("numberPing", true);

        toggle_feature_set(&mut flags, FeatureSet::Optimized);
        assert!(OPTIMIZATION_FLAGS
            .iter()
            .all(|flag| flags.get(flag) == Some(true)));

        toggle_feature_set(&mut flags, FeatureSet::Vanilla);
        assert!(OPTIMIZATION_FLAGS
            .iter()
            .all(|flag| flags.get(flag) == Some(false)));

        // Flags outside of the set are left alone
        assert_eq!(flags.get("numberPing"), Some(true));
        assert_eq!(flags.iter().count(), 15);
    }

    #[test]
    fn invalidation() {
        let mut registry = EnhancementRegistry::new();
        let font = counting(&mut registry, "EnhancedFontRenderer");
        let item = counting(&mut registry, "EnhancedItemRenderer");
        let other = counting(&mut registry, "EnhancedEntityRenderer");

        registry.invalidate("EnhancedEntityRenderer").unwrap();
        assert_eq!(other.load(Ordering::SeqCst), 1);
        assert!(matches!(
            registry.invalidate("Missing"),
            Err(Error::UnknownEnhancement(_))
        ));

        reset_caches(&mut registry).unwrap();
        assert_eq!(font.load(Ordering::SeqCst), 1);
        assert_eq!(item.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 1);

        registry.invalidate_all();
        assert_eq!(font.load(Ordering::SeqCst), 2);
        assert_eq!(other.load(Ordering::SeqCst), 2);
        assert_eq!(registry.names().count(), 3);
    }

    #[test]
    fn reset_needs_both_renderers() {
        let mut registry = EnhancementRegistry::new();
        counting(&mut registry, "EnhancedFontRenderer");
        assert!(matches!(
            reset_caches(&mut registry),
            Err(Error::UnknownEnhancement(name)) if name == "EnhancedItemRenderer"
        ));
    }
}
