use crate::error::{PipelineError, Result};
use crate::pipelines::utils::text::{char_slice, lowercase_preserving_offsets, preview};
use serde::{Deserialize, Serialize};

/// A sentence and the aspect terms to score in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectInput {
    /// The raw sentence.
    pub text: String,
    /// Aspect terms, each occurring in `text`.
    pub aspects: Vec<String>,
    /// Known character span of each aspect, parallel to `aspects`. Missing or `None`
    /// entries are found with [`AspectInput::locate`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Option<(usize, usize)>>,
}

impl AspectInput {
    /// Placeholder marking the aspect position in [`AspectInput::from_marked`].
    pub const PLACEHOLDER: &'static str = "$T$";

    /// A sentence with its aspect terms.
    pub fn new<S: Into<String>>(text: impl Into<String>, aspects: impl IntoIterator<Item = S>) -> Self {
        Self {
            text: text.into(),
            aspects: aspects.into_iter().map(Into::into).collect(),
            spans: Vec::new(),
        }
    }

    /// Build from a sentence where the first `$T$` stands for `aspect`.
    ///
    /// The aspect is scored at the placeholder position even when the same word occurs
    /// elsewhere in the sentence.
    ///
    /// ```rust
    /// # use sgnlp::aspect_sentiment::AspectInput;
    /// let input = AspectInput::from_marked("The $T$ was cold.", "soup").unwrap();
    /// assert_eq!(input.text, "The soup was cold.");
    /// assert_eq!(input.aspects, vec!["soup"]);
    /// assert_eq!(input.span_of(0), Some((4, 8)));
    /// ```
    pub fn from_marked(marked: &str, aspect: &str) -> Result<Self> {
        let Some((left, right)) = marked.split_once(Self::PLACEHOLDER) else {
            return Err(PipelineError::InputValidation(format!(
                "'{}' has no {} placeholder",
                preview(marked),
                Self::PLACEHOLDER
            )));
        };
        let aspect = aspect.trim();
        if aspect.is_empty() {
            return Err(PipelineError::InputValidation("aspect is empty".to_string()));
        }

        let start = left.chars().count();
        let span = (start, start + aspect.chars().count());
        Ok(Self {
            text: format!("{left}{aspect}{right}"),
            aspects: vec![aspect.to_string()],
            spans: vec![Some(span)],
        })
    }

    /// Character span to score aspect `index` at.
    ///
    /// A recorded span is used when it still covers the aspect text; otherwise the first
    /// occurrence is located.
    pub fn span_of(&self, index: usize) -> Option<(usize, usize)> {
        let aspect = self.aspects.get(index)?;
        let pinned = self.spans.get(index).copied().flatten().filter(|&(start, end)| {
            end <= self.text.chars().count()
                && lowercase_preserving_offsets(&char_slice(&self.text, start, end))
                    == lowercase_preserving_offsets(aspect.trim())
        });
        pinned.or_else(|| self.locate(aspect))
    }

    /// Character span of the first case-insensitive occurrence of `aspect`.
    pub fn locate(&self, aspect: &str) -> Option<(usize, usize)> {
        let needle = lowercase_preserving_offsets(aspect.trim());
        if needle.is_empty() {
            return None;
        }
        let haystack = lowercase_preserving_offsets(&self.text);
        let byte_start = haystack.find(&needle)?;
        let start = haystack[..byte_start].chars().count();
        Some((start, start + needle.chars().count()))
    }
}
