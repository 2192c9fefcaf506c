//! Option Mapper
//!
//! Translates the caller's option bundle into provider body fields. Only
//! fields the caller set are forwarded.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Stop sequences as a comma-separated string or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopInput {
    Joined(String),
    List(Vec<String>),
}

impl StopInput {
    /// Ordered stop sequences; empty when nothing usable was given.
    pub fn sequences(&self) -> Vec<String> {
        match self {
            StopInput::Joined(s) if s.is_empty() => Vec::new(),
            StopInput::Joined(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
            StopInput::List(items) => items.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// Flat option bundle as the caller supplied it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsInput {
    /// `<= 0` means "provider default".
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub stop: Option<StopInput>,
    pub stream: Option<bool>,
    pub response_format: Option<ResponseFormat>,
    /// Consumed by the message builder, never forwarded.
    pub system_prompt: Option<String>,
}

impl OptionsInput {
    /// Copy keeping only `max_tokens`, `temperature` and `top_p`.
    pub fn sampling_only(&self) -> OptionsInput {
        OptionsInput {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            ..OptionsInput::default()
        }
    }
}

/// Provider body fields for the options the caller set.
pub fn map_options(options: &OptionsInput) -> Map<String, Value> {
    let mut fields = Map::new();

    if let Some(max_tokens) = options.max_tokens.filter(|m| *m > 0) {
        fields.insert("max_tokens".into(), json!(max_tokens));
    }

    let numeric = [
        ("temperature", options.temperature),
        ("top_p", options.top_p),
        ("frequency_penalty", options.frequency_penalty),
        ("presence_penalty", options.presence_penalty),
    ];
    for (name, value) in numeric {
        if let Some(v) = value {
            fields.insert(name.into(), json!(v));
        }
    }

    if let Some(ref stop) = options.stop {
        let sequences = stop.sequences();
        if !sequences.is_empty() {
            fields.insert("stop".into(), json!(sequences));
        }
    }

    if let Some(stream) = options.stream {
        fields.insert("stream".into(), json!(stream));
    }

    if options.response_format == Some(ResponseFormat::JsonObject) {
        fields.insert("response_format".into(), json!({ "type": "json_object" }));
    }

    fields
}

/// Fallback sampling values for the always-on chat model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatDefaults {
    pub temperature: f64,
    pub max_tokens: i64,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl ChatDefaults {
    /// Fill in fields the caller left unset.
    pub fn apply(&self, fields: &mut Map<String, Value>) {
        fields
            .entry("temperature")
            .or_insert_with(|| json!(self.temperature));
        fields
            .entry("max_tokens")
            .or_insert_with(|| json!(self.max_tokens));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_are_omitted() {
        assert!(map_options(&OptionsInput::default()).is_empty());
    }

    #[test]
    fn comma_stop_string_is_split_and_trimmed() {
        let opts = OptionsInput {
            stop: Some(StopInput::Joined(r"\n,END".to_string())),
            ..Default::default()
        };
        let fields = map_options(&opts);
        assert_eq!(fields["stop"], json!([r"\n", "END"]));

        let opts = OptionsInput {
            stop: Some(StopInput::Joined(" a , b ".to_string())),
            ..Default::default()
        };
        assert_eq!(map_options(&opts)["stop"], json!(["a", "b"]));
    }

    #[test]
    fn empty_stop_string_omits_field() {
        let opts = OptionsInput {
            stop: Some(StopInput::Joined(String::new())),
            ..Default::default()
        };
        assert!(!map_options(&opts).contains_key("stop"));
    }

    #[test]
    fn numeric_fields_pass_through() {
        let opts = OptionsInput {
            max_tokens: Some(256),
            temperature: Some(0.2),
            top_p: Some(0.9),
            frequency_penalty: Some(-1.0),
            presence_penalty: Some(0.5),
            stream: Some(false),
            ..Default::default()
        };
        let fields = map_options(&opts);
        assert_eq!(fields["max_tokens"], json!(256));
        assert_eq!(fields["temperature"], json!(0.2));
        assert_eq!(fields["top_p"], json!(0.9));
        assert_eq!(fields["frequency_penalty"], json!(-1.0));
        assert_eq!(fields["presence_penalty"], json!(0.5));
        assert_eq!(fields["stream"], json!(false));
    }

    #[test]
    fn non_positive_max_tokens_means_unset() {
        let opts = OptionsInput {
            max_tokens: Some(-1),
            ..Default::default()
        };
        assert!(!map_options(&opts).contains_key("max_tokens"));
    }

    #[test]
    fn json_response_format_and_system_prompt() {
        let opts = OptionsInput {
            response_format: Some(ResponseFormat::JsonObject),
            system_prompt: Some("be brief".into()),
            ..Default::default()
        };
        let fields = map_options(&opts);
        assert_eq!(fields["response_format"], json!({"type": "json_object"}));
        assert!(!fields.contains_key("system_prompt"));

        let opts = OptionsInput {
            response_format: Some(ResponseFormat::Text),
            ..Default::default()
        };
        assert!(map_options(&opts).is_empty());
    }

    #[test]
    fn chat_defaults_fill_only_missing_fields() {
        let mut fields = map_options(&OptionsInput {
            temperature: Some(0.1),
            ..Default::default()
        });
        ChatDefaults::default().apply(&mut fields);
        assert_eq!(fields["temperature"], json!(0.1));
        assert_eq!(fields["max_tokens"], json!(1024));
    }

    #[test]
    fn deserializes_both_stop_shapes() {
        let opts: OptionsInput = serde_json::from_value(json!({"stop": ["x", "y"]})).unwrap();
        assert_eq!(opts.stop.unwrap().sequences(), vec!["x", "y"]);

        let opts: OptionsInput = serde_json::from_value(json!({"stop": "x,y"})).unwrap();
        assert_eq!(opts.stop.unwrap().sequences(), vec!["x", "y"]);
    }
}
