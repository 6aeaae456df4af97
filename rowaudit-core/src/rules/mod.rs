//! Rule resolution.
//!
//! A rule is identified by a `(rule_type, rule_code)` pair. The type selects a
//! [`PredicateFamily`]; the family turns the code into a [`Predicate`]. The
//! [`RuleCatalog`] performs that lookup once per rule when a stage opens, so
//! the row path only ever calls [`Predicate::evaluate`].
//!
//! # Example
//! ```rust
//! use rowaudit_core::rules::RuleCatalog;
//!
//! let catalog = RuleCatalog::builtin();
//! let predicate = catalog.resolve("regex", "notEmpty").unwrap();
//!
//! assert!(predicate.evaluate("a@x.com").unwrap());
//! assert!(!predicate.evaluate("").unwrap());
//! ```

mod builtin;

pub use builtin::{LengthFamily, PatternFamily, RegexFamily};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::QualityError;

/// Error raised by a predicate while evaluating a value.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// A resolved rule check over the textual form of a field value.
///
/// Implementations must be deterministic and free of side effects; the same
/// predicate instance is shared by every row and every worker.
pub trait Predicate: Send + Sync + fmt::Debug {
    /// Returns whether `value` passes the check.
    ///
    /// # Errors
    /// Returns an error when the value cannot be evaluated at all. Such
    /// failures fail the row's batch rather than counting as dirty.
    fn evaluate(&self, value: &str) -> std::result::Result<bool, PredicateError>;
}

/// A family of predicates selected by rule type.
pub trait PredicateFamily: Send + Sync {
    /// Rule type this family answers to.
    fn name(&self) -> &str;

    /// Resolves a rule code into a predicate.
    ///
    /// Returns `Ok(None)` when the family has no predicate for `code`.
    ///
    /// # Errors
    /// Returns a configuration error when `code` is recognisable but malformed.
    fn resolve(&self, code: &str) -> crate::Result<Option<Arc<dyn Predicate>>>;

    /// Human-readable list of the codes this family accepts.
    fn codes(&self) -> Vec<String>;
}

/// Lookup table of predicate families and individually registered predicates.
#[derive(Clone, Default)]
pub struct RuleCatalog {
    families: HashMap<String, Arc<dyn PredicateFamily>>,
    predicates: HashMap<(String, String), Arc<dyn Predicate>>,
}

impl fmt::Debug for RuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut families: Vec<&str> = self.families.keys().map(String::as_str).collect();
        families.sort_unstable();
        f.debug_struct("RuleCatalog")
            .field("families", &families)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl RuleCatalog {
    /// Creates a catalog with no families.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a catalog with the built-in `regex`, `pattern` and `length`
    /// families.
    pub fn builtin() -> Self {
        Self::empty()
            .with_family(RegexFamily)
            .with_family(PatternFamily)
            .with_family(LengthFamily)
    }

    /// Builder method to register a family, replacing any family of the same
    /// name.
    pub fn with_family<F>(mut self, family: F) -> Self
    where
        F: PredicateFamily + 'static,
    {
        self.families
            .insert(family.name().to_string(), Arc::new(family));
        self
    }

    /// Builder method to register a single predicate. Registered predicates
    /// take precedence over family resolution.
    pub fn with_predicate<P>(
        mut self,
        rule_type: impl Into<String>,
        rule_code: impl Into<String>,
        predicate: P,
    ) -> Self
    where
        P: Predicate + 'static,
    {
        self.predicates
            .insert((rule_type.into(), rule_code.into()), Arc::new(predicate));
        self
    }

    /// Resolves a `(rule_type, rule_code)` pair.
    ///
    /// # Errors
    /// Returns `QualityError::RuleNotFound` when neither a registered predicate
    /// nor a family answers the pair, or the family's configuration error for
    /// a malformed code.
    pub fn resolve(&self, rule_type: &str, rule_code: &str) -> crate::Result<Arc<dyn Predicate>> {
        if let Some(predicate) = self
            .predicates
            .get(&(rule_type.to_string(), rule_code.to_string()))
        {
            return Ok(Arc::clone(predicate));
        }

        let family = self
            .families
            .get(rule_type)
            .ok_or_else(|| QualityError::rule_not_found(rule_type, rule_code))?;

        family
            .resolve(rule_code)?
            .ok_or_else(|| QualityError::rule_not_found(rule_type, rule_code))
    }

    /// Codes accepted by each family, keyed by rule type.
    pub fn describe(&self) -> BTreeMap<String, Vec<String>> {
        let mut described: BTreeMap<String, Vec<String>> = self
            .families
            .iter()
            .map(|(name, family)| (name.clone(), family.codes()))
            .collect();

        for (rule_type, rule_code) in self.predicates.keys() {
            described
                .entry(rule_type.clone())
                .or_default()
                .push(rule_code.clone());
        }
        for codes in described.values_mut() {
            codes.sort();
            codes.dedup();
        }
        described
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AlwaysFails;

    impl Predicate for AlwaysFails {
        fn evaluate(&self, _value: &str) -> std::result::Result<bool, PredicateError> {
            Err("backend unavailable".into())
        }
    }

    #[derive(Debug)]
    struct StartsWithA;

    impl Predicate for StartsWithA {
        fn evaluate(&self, value: &str) -> std::result::Result<bool, PredicateError> {
            Ok(value.starts_with('a'))
        }
    }

    #[test]
    fn test_builtin_resolution() {
        let catalog = RuleCatalog::builtin();
        assert!(catalog.resolve("regex", "email").is_ok());
        assert!(catalog.resolve("pattern", "^[0-9]{3}$").is_ok());
        assert!(catalog.resolve("length", "1..8").is_ok());
    }

    #[test]
    fn test_unknown_type_and_code() {
        let catalog = RuleCatalog::builtin();
        assert!(matches!(
            catalog.resolve("checksum", "luhn"),
            Err(QualityError::RuleNotFound { .. })
        ));
        assert!(matches!(
            catalog.resolve("regex", "noSuchFormat"),
            Err(QualityError::RuleNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_code_is_configuration_error() {
        let catalog = RuleCatalog::builtin();
        assert!(matches!(
            catalog.resolve("pattern", "(unclosed"),
            Err(QualityError::Configuration { .. })
        ));
    }

    #[test]
    fn test_registered_predicate_takes_precedence() {
        let catalog = RuleCatalog::builtin().with_predicate("regex", "notEmpty", StartsWithA);
        let predicate = catalog.resolve("regex", "notEmpty").unwrap();
        assert!(!predicate.evaluate("b").unwrap());
        assert!(predicate.evaluate("abc").unwrap());
    }

    #[test]
    fn test_predicate_errors_surface() {
        let catalog = RuleCatalog::empty().with_predicate("remote", "lookup", AlwaysFails);
        let predicate = catalog.resolve("remote", "lookup").unwrap();
        assert!(predicate.evaluate("x").is_err());
    }

    #[test]
    fn test_describe_lists_families() {
        let described = RuleCatalog::builtin()
            .with_predicate("custom", "startsWithA", StartsWithA)
            .describe();
        assert!(described["regex"].contains(&"notEmpty".to_string()));
        assert!(described.contains_key("pattern"));
        assert!(described.contains_key("length"));
        assert_eq!(described["custom"], vec!["startsWithA".to_string()]);
    }
}
