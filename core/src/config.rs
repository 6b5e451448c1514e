use crate::llm::LlmProviderKind;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AiRuntimeSettings {
    pub provider: LlmProviderKind,
    pub gemini: Option<GeminiSettings>,
}

#[derive(Debug, Clone, Default)]
pub struct GeminiSettings {
    pub api_key: String,
    /// Empty means the public Generative Language endpoint.
    pub base_url: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AiConfigError {
    #[error("AI not configured—create gemchat.yaml or set GEMINI_API_KEY.")]
    Missing,
    #[error("AI configuration invalid: {0}")]
    Invalid(String),
}

impl AiConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing => {
                "AI not configured—create gemchat.yaml or set GEMINI_API_KEY.".to_string()
            }
            Self::Invalid(detail) => {
                format!("AI not configured—{detail}. Update gemchat.yaml.")
            }
        }
    }
}

impl AiRuntimeSettings {
    pub fn mock() -> Self {
        Self {
            provider: LlmProviderKind::Mock,
            gemini: None,
        }
    }

    /// Loads `gemchat.yaml` from the usual locations, falling back to
    /// `GEMINI_API_KEY` / `API_KEY` from the environment or a `.env` file.
    pub fn load() -> Result<Self, AiConfigError> {
        if let Some(path) = locate_config_file() {
            return Self::load_from(&path);
        }
        dotenvy::dotenv().ok();
        from_environment()
    }

    pub fn load_from(path: &Path) -> Result<Self, AiConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            AiConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: GemchatConfig = serde_yaml::from_str(&contents)
            .map_err(|err| AiConfigError::Invalid(format!("invalid gemchat.yaml: {err}")))?;
        let app = config
            .app
            .ok_or_else(|| AiConfigError::Invalid("missing `app` section".to_string()))?;
        tracing::debug!(path = %path.display(), "loaded AI settings");
        resolve_app_settings(app)
    }
}

fn from_environment() -> Result<AiRuntimeSettings, AiConfigError> {
    if LlmProviderKind::from_environment() == LlmProviderKind::Mock {
        return Ok(AiRuntimeSettings::mock());
    }
    let api_key = ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .ok_or(AiConfigError::Missing)?;
    Ok(AiRuntimeSettings {
        provider: LlmProviderKind::Gemini,
        gemini: Some(GeminiSettings {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or_default(),
        }),
    })
}

fn resolve_app_settings(app: AppSection) -> Result<AiRuntimeSettings, AiConfigError> {
    let provider = app.provider.unwrap_or(LlmProviderKind::Gemini);
    match provider {
        LlmProviderKind::Gemini => {
            let section = app.gemini.unwrap_or_default();
            let api_key = section.api_key.trim().to_string();
            if api_key.is_empty() {
                return Err(AiConfigError::Invalid(
                    "missing Gemini api key in gemchat.yaml".to_string(),
                ));
            }
            Ok(AiRuntimeSettings {
                provider,
                gemini: Some(GeminiSettings {
                    api_key,
                    base_url: section.base_url.trim().to_string(),
                }),
            })
        }
        LlmProviderKind::Mock => Ok(AiRuntimeSettings::mock()),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    gemchat_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn gemchat_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("gemchat");
        paths.push(config_dir.join("gemchat.yaml"));
        paths.push(config_dir.join("gemchat.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".gemchat").join("gemchat.yaml"));
        paths.push(home_dir.join(".gemchat").join("gemchat.yml"));
    } else {
        paths.push(PathBuf::from("gemchat.yaml"));
        paths.push(PathBuf::from("gemchat.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct GemchatConfig {
    app: Option<AppSection>,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    provider: Option<LlmProviderKind>,
    gemini: Option<GeminiSection>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiSection {
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_gemini_settings() {
        let app = AppSection {
            provider: Some(LlmProviderKind::Gemini),
            gemini: Some(GeminiSection {
                api_key: " test-key ".into(),
                base_url: "https://proxy.example".into(),
            }),
        };
        let settings = resolve_app_settings(app).expect("gemini settings");
        assert_eq!(settings.provider, LlmProviderKind::Gemini);
        let gemini = settings.gemini.as_ref().unwrap();
        assert_eq!(gemini.api_key, "test-key");
        assert_eq!(gemini.base_url, "https://proxy.example");
    }

    #[test]
    fn mock_provider_needs_no_credentials() {
        let app = AppSection {
            provider: Some(LlmProviderKind::Mock),
            gemini: None,
        };
        let settings = resolve_app_settings(app).expect("mock settings");
        assert_eq!(settings.provider, LlmProviderKind::Mock);
        assert!(settings.gemini.is_none());
    }

    #[test]
    fn errors_without_credentials() {
        let app = AppSection {
            provider: None,
            gemini: Some(GeminiSection::default()),
        };
        let err = resolve_app_settings(app).unwrap_err();
        assert!(matches!(err, AiConfigError::Invalid(_)));
        assert!(err.user_message().contains("Gemini api key"));
    }

    #[test]
    fn loads_yaml_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("gemchat.yaml");
        fs::write(
            &path,
            "app:\n  provider: gemini\n  gemini:\n    api_key: from-file\n",
        )
        .unwrap();
        let settings = AiRuntimeSettings::load_from(&path).expect("settings");
        assert_eq!(settings.gemini.unwrap().api_key, "from-file");
    }

    #[test]
    fn rejects_file_without_app_section() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("gemchat.yaml");
        fs::write(&path, "other: true\n").unwrap();
        let err = AiRuntimeSettings::load_from(&path).unwrap_err();
        assert!(matches!(err, AiConfigError::Invalid(detail) if detail.contains("app")));
    }
}
