//! Run-identifier parsing.
//!
//! Result files pack the model id and prompt language into one file stem with
//! historically inconsistent separators (`qwen3:8b-en`, `llama3.1:70b_no`,
//! `norwai-mixtral-8x7b:en`). Everything that needs to pull those apart goes
//! through this module so the statistical code only ever sees typed values.

use regex::Regex;
use thiserror::Error;

/// Separators tried, in order, between the model id and the language code
pub const LANGUAGE_SEPARATORS: [char; 3] = ['_', '-', ':'];

/// Label suffix marking a run that was pinned to every GPU on the node
pub const ALL_GPUS_MARKER: &str = "-all-gpus";

/// A run name split into base model and language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunName {
    pub base_id: String,
    pub lang: String,
}

/// The stem carries no known language suffix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no known language suffix in run name '{0}'")]
pub struct UnparseableName(pub String);

/// Split `stem` into (base model, language).
///
/// Languages are tried in the given order and, for each, the separators in
/// [`LANGUAGE_SEPARATORS`] order; the first suffix that matches and leaves a
/// non-empty base wins.
///
/// # Errors
///
/// Returns `UnparseableName` if no `<sep><lang>` suffix matches.
pub fn split_model_lang<S: AsRef<str>>(
    stem: &str,
    languages: &[S],
) -> Result<RunName, UnparseableName> {
    for lang in languages.iter().map(AsRef::as_ref) {
        for sep in LANGUAGE_SEPARATORS {
            let suffix = format!("{sep}{lang}");
            if stem.len() > suffix.len() {
                if let Some(base) = stem.strip_suffix(&suffix) {
                    return Ok(RunName {
                        base_id: base.to_string(),
                        lang: lang.to_string(),
                    });
                }
            }
        }
    }
    Err(UnparseableName(stem.to_string()))
}

/// Base model id of a run stem, or the whole stem when it carries no suffix
#[must_use]
pub fn base_model_id<S: AsRef<str>>(stem: &str, languages: &[S]) -> String {
    split_model_lang(stem, languages).map_or_else(|_| stem.to_string(), |name| name.base_id)
}

/// Model id with any registry/namespace prefix dropped (`hf.co/org/m` -> `m`)
#[must_use]
pub fn model_component(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

/// File stem a run is written under: `<model component>-<lang>`
#[must_use]
pub fn output_stem(model: &str, lang: &str) -> String {
    format!("{}-{lang}", model_component(model))
}

/// Drop the all-GPUs marker from a base model id
#[must_use]
pub fn fold_all_gpus(base_id: &str) -> String {
    base_id.replace(ALL_GPUS_MARKER, "")
}

/// Parameter count parsed from a model name, with its display label
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSize {
    /// Billions of parameters; 0.0 when nothing could be parsed
    pub billions: f64,
    pub label: String,
}

/// Compiled patterns for family and size extraction
#[derive(Debug, Clone)]
pub struct NameParser {
    family: Regex,
    size: Regex,
}

impl NameParser {
    /// # Errors
    ///
    /// Returns a `regex::Error` if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            family: Regex::new(r"^[a-zA-Z0-9\-.]+")?,
            size: Regex::new(r"(\d+\.?\d*)([bBmM])")?,
        })
    }

    /// Family: the leading run of letters, digits, `-` and `.`
    /// (`qwen2.5:7b` -> `qwen2.5`)
    #[must_use]
    pub fn family<'a>(&self, base_id: &'a str) -> Option<&'a str> {
        self.family.find(base_id).map(|m| m.as_str())
    }

    /// Parse the size of a model. A few fine-tuned variants share a size with
    /// their base model and get a nudged sort key so they stay distinct.
    #[must_use]
    pub fn model_size(&self, base_id: &str) -> ModelSize {
        if base_id.contains("llama") && base_id.contains("instruct") {
            return ModelSize {
                billions: 71.0,
                label: "70B-instruct".to_string(),
            };
        }
        if base_id.contains("mimir") {
            return if base_id.contains("scratch") {
                ModelSize {
                    billions: 7.0,
                    label: "7B-core-scratch-instruct".to_string(),
                }
            } else {
                ModelSize {
                    billions: 8.0,
                    label: "7B-core-instruct".to_string(),
                }
            };
        }

        let Some(caps) = self.size.captures(base_id) else {
            return ModelSize {
                billions: 0.0,
                label: base_id.to_string(),
            };
        };
        let value_str = &caps[1];
        let unit = &caps[2];
        let value: f64 = value_str.parse().unwrap_or(0.0);
        let label = format!("{value_str}{}", unit.to_uppercase());
        let billions = if unit.eq_ignore_ascii_case("m") {
            value / 1000.0
        } else {
            value
        };
        ModelSize { billions, label }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const LANGS: [&str; 2] = ["en", "no"];

    #[test]
    fn test_split_all_separators() {
        for (stem, base, lang) in [
            ("qwen3:8b-en", "qwen3:8b", "en"),
            ("llama3.1:70b_no", "llama3.1:70b", "no"),
            ("norwai-mixtral-8x7b:en", "norwai-mixtral-8x7b", "en"),
        ] {
            let name = split_model_lang(stem, &LANGS).unwrap();
            assert_eq!(name.base_id, base);
            assert_eq!(name.lang, lang);
        }
    }

    #[test]
    fn test_split_separator_order() {
        // `_en` is tried before `-en`; only one can be a suffix anyway
        let name = split_model_lang("a-b_en", &LANGS).unwrap();
        assert_eq!(name.base_id, "a-b");
    }

    #[test]
    fn test_split_requires_nonempty_base() {
        assert!(split_model_lang("-en", &LANGS).is_err());
        assert!(split_model_lang("en", &LANGS).is_err());
    }

    #[test]
    fn test_split_unparseable() {
        let err = split_model_lang("gemma3:4b", &LANGS).unwrap_err();
        assert_eq!(err, UnparseableName("gemma3:4b".to_string()));
        assert!(err.to_string().contains("gemma3:4b"));
    }

    #[test]
    fn test_split_custom_languages() {
        let name = split_model_lang("m-sv", &["sv"]).unwrap();
        assert_eq!(name.lang, "sv");
        assert!(split_model_lang("m-sv", &LANGS).is_err());
    }

    #[test]
    fn test_base_model_id_fallback() {
        assert_eq!(base_model_id("qwen3:235b_en", &LANGS), "qwen3:235b");
        assert_eq!(base_model_id("qwen3:235b", &LANGS), "qwen3:235b");
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("qwen3:8b", "en"), "qwen3:8b-en");
        assert_eq!(
            output_stem("hf.co/NorwAI/NorwAI-Magistral-24B-reasoning:Q8:0", "no"),
            "NorwAI-Magistral-24B-reasoning:Q8:0-no"
        );
    }

    #[test]
    fn test_fold_all_gpus() {
        assert_eq!(fold_all_gpus("qwen3:235b-all-gpus"), "qwen3:235b");
        assert_eq!(fold_all_gpus("qwen3:8b"), "qwen3:8b");
    }

    #[test]
    fn test_family() {
        let parser = NameParser::new().unwrap();
        assert_eq!(parser.family("qwen2.5:7b"), Some("qwen2.5"));
        assert_eq!(parser.family("gpt-oss:20b"), Some("gpt-oss"));
        assert_eq!(parser.family(":odd"), None);
    }

    #[test]
    fn test_model_size() {
        let parser = NameParser::new().unwrap();

        let size = parser.model_size("qwen3:1.7b");
        assert_eq!(size.billions, 1.7);
        assert_eq!(size.label, "1.7B");

        let size = parser.model_size("gemma3:270m");
        assert!((size.billions - 0.27).abs() < 1e-12);
        assert_eq!(size.label, "270M");

        assert_eq!(parser.model_size("llama3.1:70b-instruct-q4").billions, 71.0);
        assert_eq!(
            parser.model_size("mimir-mistral:7b-core-scratch-instruct-Q4").label,
            "7B-core-scratch-instruct"
        );
        assert_eq!(parser.model_size("mimir-mistral:7b-core-instruct-Q4").billions, 8.0);

        let size = parser.model_size("unsized");
        assert_eq!(size.billions, 0.0);
        assert_eq!(size.label, "unsized");
    }
}
