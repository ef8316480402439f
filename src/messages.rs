use serde::{Deserialize, Serialize};

/// Prompt used when a request does not carry one.
pub const DEFAULT_PROMPT: &str = "Describe what is happening in this frame.";

/// How sampled frames are turned into text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum InferenceMode {
    /// One description per sampled frame.
    #[default]
    Timestamped,
    /// One description for the whole video.
    Summary,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Timestamped => "timestamped",
            InferenceMode::Summary => "summary",
        }
    }
}

// anything that is not "timestamped" is summarised
impl From<String> for InferenceMode {
    fn from(mode: String) -> Self {
        InferenceMode::from(mode.as_str())
    }
}

impl From<&str> for InferenceMode {
    fn from(mode: &str) -> Self {
        if mode.trim().eq_ignore_ascii_case("timestamped") {
            InferenceMode::Timestamped
        } else {
            InferenceMode::Summary
        }
    }
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

/// JSON body accepted by the model server and sent by the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub mode: InferenceMode,
}

impl InferenceRequest {
    pub fn new(video_url: impl Into<String>, prompt: impl Into<String>, mode: InferenceMode) -> Self {
        Self {
            video_url: Some(video_url.into()),
            prompt: prompt.into(),
            mode,
        }
    }
}

/// Description of one sampled frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDescription {
    /// Seconds from the start of the video, rounded to 2 decimals.
    pub timestamp: f64,
    pub frame_number: usize,
    pub description: String,
}

/// Outcome of an inference request. Exactly one shape is ever populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceResult {
    Frames { frames: Vec<FrameDescription> },
    Summary { description: String },
    Error { error: String },
}

impl InferenceResult {
    pub fn error(&self) -> Option<&str> {
        match self {
            InferenceResult::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults() {
        let req: InferenceRequest =
            serde_json::from_value(json!({ "video_url": "https://a/b.mp4" })).unwrap();
        assert_eq!(req.prompt, DEFAULT_PROMPT);
        assert_eq!(req.mode, InferenceMode::Timestamped);

        let req: InferenceRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.video_url, None);
    }

    #[test]
    fn unknown_modes_summarise() {
        let req: InferenceRequest =
            serde_json::from_value(json!({ "video_url": "u", "mode": "summary" })).unwrap();
        assert_eq!(req.mode, InferenceMode::Summary);

        let req: InferenceRequest =
            serde_json::from_value(json!({ "video_url": "u", "mode": "overview" })).unwrap();
        assert_eq!(req.mode, InferenceMode::Summary);

        assert_eq!(InferenceMode::from("Timestamped"), InferenceMode::Timestamped);
    }

    #[test]
    fn request_serializes_mode_lowercase() {
        let req = InferenceRequest::new("u", "p", InferenceMode::Summary);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "video_url": "u", "prompt": "p", "mode": "summary" })
        );
    }

    #[test]
    fn result_shapes() {
        let frames = InferenceResult::Frames {
            frames: vec![FrameDescription {
                timestamp: 0.5,
                frame_number: 15,
                description: "a cat".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&frames).unwrap(),
            json!({ "frames": [{ "timestamp": 0.5, "frame_number": 15, "description": "a cat" }] })
        );

        let summary: InferenceResult =
            serde_json::from_value(json!({ "description": "a dog" })).unwrap();
        assert_eq!(summary, InferenceResult::Summary { description: "a dog".into() });

        let error: InferenceResult = serde_json::from_value(json!({ "error": "boom" })).unwrap();
        assert_eq!(error.error(), Some("boom"));
        assert!(!summary.is_error());
    }
}
