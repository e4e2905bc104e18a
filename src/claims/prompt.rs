//! Prompt templates used by [`super::ClaimProcessor`].

use super::ClaimError;

const ACCURACY_SYSTEM: &str = "You are a strict auditor of insurance policy information. \
     Check factual correctness only.";

const QUALITY_SYSTEM: &str = "You are a strict evaluator of insurance claim summaries. \
     Score 0-5 for: clarity, completeness, organization, overall_quality. \
     Return ONLY JSON with numeric scores and a short justification per metric.";

/// A prompt together with the sampling settings it is run with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PromptTemplate<'a> {
    /// Pulls the key fields out of a claim document as JSON.
    ExtractInfo {
        /// Full claim document text.
        document: &'a str,
    },
    /// Condenses extracted fields into a short summary.
    Summarise {
        /// Output of [`Self::ExtractInfo`].
        extracted: &'a str,
    },
    /// Asks a judge to check a summary against its source document.
    Accuracy {
        /// Full claim document text.
        document: &'a str,
        /// Summary under review.
        summary: &'a str,
    },
    /// Asks a judge to grade a summary's writing.
    Quality {
        /// Summary under review.
        summary: &'a str,
    },
}

impl PromptTemplate<'_> {
    /// Fills the template.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::BlankInput`] when any substituted value is blank.
    pub fn render(&self) -> Result<String, ClaimError> {
        match *self {
            Self::ExtractInfo { document } => Ok(format!(
                "Extract the following information from this insurance claim document:\n\
                 - Claimant Name\n\
                 - Patient Name if different than Claimant Name\n\
                 - Name of the person who signs the claim form\n\
                 - Policy Number\n\
                 - Claim Amount\n\
                 - Incident Date\n\
                 - Incident Description\n\n\
                 Document:\n{}\n\n\
                 Return the information in JSON format.",
                filled("document", document)?
            )),
            Self::Summarise { extracted } => Ok(format!(
                "Based on this extracted information:\n{}\n\n\
                 Generate a concise summary of the claim.",
                filled("extracted information", extracted)?
            )),
            Self::Accuracy { document, summary } => Ok(format!(
                "Claim Document:\n{}\n\nClaim Summary:\n{}\n\n\
                 Evaluate factual accuracy. Return a score from 0-1 and list any inaccuracies.",
                filled("document", document)?,
                filled("summary", summary)?
            )),
            Self::Quality { summary } => Ok(format!(
                "Evaluate the summary using these criteria:\n\
                 - Clarity\n\
                 - Completeness\n\
                 - Conciseness\n\
                 - Professional tone\n\n\
                 Score each 1-5 and provide an overall score.\n\n\
                 Summary:\n{}",
                filled("summary", summary)?
            )),
        }
    }

    /// System prompt replacing the model's default, if any.
    #[must_use]
    pub const fn system(&self) -> Option<&'static str> {
        match self {
            Self::ExtractInfo { .. } | Self::Summarise { .. } => None,
            Self::Accuracy { .. } => Some(ACCURACY_SYSTEM),
            Self::Quality { .. } => Some(QUALITY_SYSTEM),
        }
    }

    /// Token limit for the response.
    #[must_use]
    pub const fn max_tokens(&self) -> u32 {
        match self {
            Self::ExtractInfo { .. } => 1024,
            Self::Summarise { .. } | Self::Accuracy { .. } | Self::Quality { .. } => 512,
        }
    }

    /// Sampling temperature. Extraction runs deterministically.
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        match self {
            Self::ExtractInfo { .. } => 0.0,
            Self::Summarise { .. } | Self::Accuracy { .. } | Self::Quality { .. } => 0.5,
        }
    }
}

fn filled<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ClaimError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClaimError::BlankInput { field });
    }
    Ok(trimmed)
}
