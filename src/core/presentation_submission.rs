use super::{
    credential_format::*, input_descriptor::*, object::TypedParameter,
    presentation_definition::{MatchedInputs, PresentationDefinition},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions are objects embedded within target claim
/// negotiation formats that express how the inputs presented as proofs to a
/// Verifier are provided in accordance with the requirements specified in a
/// [PresentationDefinition].
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: DescriptorMapId,
    descriptor_map: Vec<DescriptorMap>,
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

/// Where a submitted credential sits in the `vp_token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPosition {
    /// Index of the presentation in the `vp_token` array.
    pub presentation: usize,
    /// Index of the credential in that presentation's `verifiableCredential`.
    pub credential: usize,
}

impl PresentationSubmission {
    pub fn new(
        id: uuid::Uuid,
        definition_id: DescriptorMapId,
        descriptor_map: Vec<DescriptorMap>,
    ) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Build the submission for credentials laid out across one or more presentations.
    ///
    /// `position` maps a candidate index from `matches` to its place in the
    /// `vp_token`; `presentation_count` decides whether presentations are
    /// addressed as `$` (single) or `$[n]` (array). Credential entries are
    /// nested under a `jwt_vp` entry for their presentation.
    pub fn for_presentations(
        definition: &PresentationDefinition,
        matches: &MatchedInputs,
        presentation_count: usize,
        position: impl Fn(usize) -> Option<(CredentialPosition, ClaimFormatDesignation)>,
    ) -> Result<Self, SubmissionError> {
        let mut descriptor_map = Vec::new();

        for (descriptor_id, indexes) in &matches.by_descriptor {
            for &index in indexes {
                let (at, format) =
                    position(index).ok_or(SubmissionError::UnplacedCredential(index))?;

                let outer_path = if presentation_count > 1 {
                    format!("$[{}]", at.presentation)
                } else {
                    "$".to_owned()
                };

                let nested = DescriptorMap::new(
                    descriptor_id.clone(),
                    format,
                    parse_path(&format!("$.verifiableCredential[{}]", at.credential))?,
                );

                descriptor_map.push(
                    DescriptorMap::new(
                        descriptor_id.clone(),
                        ClaimFormatDesignation::JwtVp,
                        parse_path(&outer_path)?,
                    )
                    .set_path_nested(nested),
                );
            }
        }

        Ok(Self::new(
            uuid::Uuid::new_v4(),
            definition.id().clone(),
            descriptor_map,
        ))
    }

    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }
}

fn parse_path(path: &str) -> Result<JsonPath, SubmissionError> {
    JsonPath::parse(path).map_err(|e| SubmissionError::InvalidPath(path.to_owned(), e.to_string()))
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = anyhow::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(raw).map_err(Into::into)
    }
}

impl From<PresentationSubmission> for Json {
    fn from(value: PresentationSubmission) -> Self {
        serde_json::to_value(value).unwrap_or_default()
    }
}

/// Descriptor Maps describe the information a Holder provides to a Verifier.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    pub path: JsonPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<ClaimFormatDesignation>,
        path: JsonPath,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path,
            path_nested: None,
        }
    }

    /// Set the nested path of the descriptor map.
    ///
    /// The `id` property MUST be the same for each level of nesting.
    pub fn set_path_nested(mut self, mut path_nested: DescriptorMap) -> Self {
        path_nested.id.clone_from(&self.id);

        self.path_nested = Some(Box::new(path_nested));

        self
    }
}

/// Presentation submission error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("invalid JSONPath `{0}`: {1}")]
    InvalidPath(String, String),

    /// A matched credential is not part of any presentation.
    #[error("matched credential {0} is not part of the presentation")]
    UnplacedCredential(usize),

    #[error("presentation submission validation failed: {0}")]
    Validation(#[from] SubmissionValidationError),
}

/// Presentation submission inputs validation error.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionValidationError {
    /// Missing an input required by the presentation definition.
    #[error("missing required input `{0}`")]
    MissingRequiredInput(String),

    /// Input group selection is too small.
    #[error("not enough inputs for group `{group}` (expected at least {min}, found {found})")]
    SelectionTooSmall {
        group: GroupId,
        min: usize,
        found: usize,
    },

    /// Input group selection is of the wrong size.
    #[error("invalid number of inputs for group `{group}` (expected {expected}, found {found})")]
    SelectionSizeMismatch {
        group: GroupId,
        expected: usize,
        found: usize,
    },
}
