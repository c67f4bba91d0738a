//! Input-source abstraction for keystroke capture.
//!
//! The decoder never talks to a concrete key-capture runtime. A host
//! environment implements [`InputSource`] and the orchestrator registers
//! the symbols it needs at startup. Partial registration is a degraded
//! but running state, reported through [`RegistrationHealth`] rather than
//! failing startup.

use crate::Result;

/// The terminator symbol ending keystroke accumulation.
pub const TERMINATOR: char = '\n';

/// Capability interface provided by the host key-capture runtime.
pub trait InputSource: Send {
    /// Binds a single symbol so its key events are delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol cannot be bound; the caller treats
    /// this as degradation, not as a fatal condition.
    fn register_symbol(&mut self, symbol: char) -> Result<()>;

    /// Releases a previously bound symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the release.
    fn unregister_symbol(&mut self, symbol: char) -> Result<()>;

    /// Releases every symbol bound by this source.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the release.
    fn unregister_all(&mut self) -> Result<()>;
}

/// The symbols the ingestion pipeline needs bound: the hex alphabet plus
/// the terminator.
#[must_use]
pub fn required_symbols() -> Vec<char> {
    let mut symbols: Vec<char> = ('0'..='9').chain('A'..='F').collect();
    symbols.push(TERMINATOR);
    symbols
}

/// How many of the required input symbols are currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegistrationHealth {
    /// Number of symbols the pipeline needs.
    pub required: usize,
    /// Number of symbols successfully bound.
    pub bound: usize,
}

impl RegistrationHealth {
    /// Returns true if at least one required symbol failed to bind.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.bound < self.required
    }

    /// Returns true if no symbol could be bound at all.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        self.bound == 0
    }
}

/// Registers every required symbol, tolerating individual failures.
///
/// Failures are logged and counted; the returned health tells the caller
/// how much of the keyboard path is live.
pub fn register_required(source: &mut dyn InputSource) -> RegistrationHealth {
    let symbols = required_symbols();
    let required = symbols.len();
    let mut bound = 0;

    for symbol in symbols {
        match source.register_symbol(symbol) {
            Ok(()) => bound += 1,
            Err(err) => {
                tracing::warn!(symbol = %symbol.escape_default(), error = %err, "Failed to bind input symbol");
            }
        }
    }

    let health = RegistrationHealth { required, bound };
    if health.is_degraded() {
        tracing::warn!(
            bound = health.bound,
            required = health.required,
            "Input source degraded; continuing with partial keyboard capture"
        );
        metrics::counter!("input_registration_degraded_total").increment(1);
    }
    health
}

/// An input source that needs no registration, e.g. a raw terminal whose
/// keystrokes already reach the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmanagedSource;

impl InputSource for UnmanagedSource {
    fn register_symbol(&mut self, _symbol: char) -> Result<()> {
        Ok(())
    }

    fn unregister_symbol(&mut self, _symbol: char) -> Result<()> {
        Ok(())
    }

    fn unregister_all(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashSet;

    struct FlakySource {
        refuse: HashSet<char>,
        bound: HashSet<char>,
    }

    impl FlakySource {
        fn refusing(refuse: impl IntoIterator<Item = char>) -> Self {
            Self {
                refuse: refuse.into_iter().collect(),
                bound: HashSet::new(),
            }
        }
    }

    impl InputSource for FlakySource {
        fn register_symbol(&mut self, symbol: char) -> Result<()> {
            if self.refuse.contains(&symbol) {
                return Err(Error::InputSource(format!("symbol {symbol} unavailable")));
            }
            self.bound.insert(symbol);
            Ok(())
        }

        fn unregister_symbol(&mut self, symbol: char) -> Result<()> {
            self.bound.remove(&symbol);
            Ok(())
        }

        fn unregister_all(&mut self) -> Result<()> {
            self.bound.clear();
            Ok(())
        }
    }

    #[test]
    fn required_symbols_cover_hex_and_terminator() {
        let symbols = required_symbols();
        assert_eq!(symbols.len(), 17);
        assert!(symbols.contains(&'0'));
        assert!(symbols.contains(&'F'));
        assert!(symbols.contains(&TERMINATOR));
    }

    #[test]
    fn full_registration_is_healthy() {
        let mut source = FlakySource::refusing([]);
        let health = register_required(&mut source);
        assert_eq!(health.bound, health.required);
        assert!(!health.is_degraded());
        assert!(!health.is_disconnected());
    }

    #[test]
    fn partial_registration_degrades_without_failing() {
        let mut source = FlakySource::refusing(['A', 'B']);
        let health = register_required(&mut source);
        assert_eq!(health.required, 17);
        assert_eq!(health.bound, 15);
        assert!(health.is_degraded());
        assert!(!health.is_disconnected());
    }

    #[test]
    fn total_registration_failure_is_disconnected() {
        let mut source = FlakySource::refusing(required_symbols());
        let health = register_required(&mut source);
        assert_eq!(health.bound, 0);
        assert!(health.is_disconnected());
    }

    #[test]
    fn unmanaged_source_accepts_everything() {
        let mut source = UnmanagedSource;
        let health = register_required(&mut source);
        assert!(!health.is_degraded());
        assert!(source.unregister_all().is_ok());
    }
}
