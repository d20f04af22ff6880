//! Enrichment strategies.

use crate::{CoreError, Enricher, Enrichment};

/// Enricher used when no classification backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEnricher;

impl Enricher for NoopEnricher {
    fn classify(&self, _url: &str) -> Result<Enrichment, CoreError> {
        Ok(Enrichment::default())
    }
}

/// Run `enricher`, replacing any failure or blank field with the defaults.
pub fn classify_or_default<E: Enricher + ?Sized>(enricher: &E, url: &str) -> Enrichment {
    match enricher.classify(url) {
        Ok(e) => {
            let defaults = Enrichment::default();
            Enrichment {
                category: non_blank(e.category).unwrap_or(defaults.category),
                summary: non_blank(e.summary).unwrap_or(defaults.summary),
            }
        }
        Err(err) => {
            tracing::warn!(err = %err, "enrichment failed; using defaults");
            Enrichment::default()
        }
    }
}

fn non_blank(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_CATEGORY, DEFAULT_SUMMARY};

    struct Fixed(Result<Enrichment, CoreError>);
    impl Enricher for Fixed {
        fn classify(&self, _url: &str) -> Result<Enrichment, CoreError> {
            self.0.clone()
        }
    }

    #[test]
    fn noop_returns_defaults() {
        assert_eq!(NoopEnricher.classify("https://x").unwrap(), Enrichment::default());
    }

    #[test]
    fn failure_degrades_to_defaults() {
        let e = Fixed(Err(CoreError::EnrichmentFailed("model down".into())));
        let out = classify_or_default(&e, "https://x");
        assert_eq!(out.category, DEFAULT_CATEGORY);
        assert_eq!(out.summary, DEFAULT_SUMMARY);
    }

    #[test]
    fn blank_fields_fall_back_individually() {
        let e = Fixed(Ok(Enrichment {
            category: " IT ".into(),
            summary: "".into(),
        }));
        let out = classify_or_default(&e, "https://x");
        assert_eq!(out.category, "IT");
        assert_eq!(out.summary, DEFAULT_SUMMARY);
    }
}
