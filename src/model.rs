use crate::frame::RgbImage;

/// Placeholder token marking where the visual input goes in a prompt.
pub const IMAGE_TOKEN: &str = "<image>";

/// Visual input of a single generation pass.
#[derive(Clone, Copy)]
pub enum VisionInput<'a> {
    /// One still image.
    Image(&'a RgbImage),
    /// An ordered sequence of frames presented to the model as one video.
    Video(&'a [RgbImage]),
}

impl VisionInput<'_> {
    pub fn len(&self) -> usize {
        match self {
            VisionInput::Image(_) => 1,
            VisionInput::Video(frames) => frames.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single generation request handed to a [`VisionLanguageModel`].
#[derive(Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Prompt text, already prefixed with [`IMAGE_TOKEN`].
    pub prompt: &'a str,
    pub input: VisionInput<'a>,
    /// Upper bound on the number of generated tokens.
    pub max_new_tokens: usize,
}

/// Trait for the pretrained vision-language models that describe video frames.
///
/// Implementors wrap a model runtime and turn one request into decoded text.
/// Models are used from a single thread and may keep mutable state between
/// calls.
pub trait VisionLanguageModel {
    /// The error type that can be returned during generation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one generation pass and returns the decoded text.
    fn generate(&mut self, request: GenerationRequest<'_>) -> Result<String, Self::Error>;
}
