use super::credential_format::*;
use super::input_descriptor::*;
use super::presentation_submission::*;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A presentation definition is a JSON object that describes the information a
/// Verifier requires of a Holder.
///
/// Presentation Definitions are composed of inputs, which describe the forms and details of the
/// proofs they require, and optional sets of selection rules, to allow Holders flexibility
/// in cases where different types of proofs may satisfy an input requirement.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<SubmissionRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
}

/// A credential offered for matching: its format and its JSON claims.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub format: &'a ClaimFormatDesignation,
    pub claims: &'a Json,
}

impl PresentationDefinition {
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    pub fn id(&self) -> &String {
        &self.id
    }

    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    /// Input descriptors indexed by id.
    pub fn input_descriptors_map(&self) -> HashMap<&str, &InputDescriptor> {
        self.input_descriptors
            .iter()
            .map(|d| (d.id.as_str(), d))
            .collect()
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_submission_requirements(mut self, requirements: Vec<SubmissionRequirement>) -> Self {
        self.submission_requirements = Some(requirements);
        self
    }

    pub fn submission_requirements(&self) -> Option<&[SubmissionRequirement]> {
        self.submission_requirements.as_deref()
    }

    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    /// The field names requested across all input descriptors, e.g.
    /// `$.credentialSubject.givenName` yields `givenName`.
    pub fn requested_fields(&self) -> Vec<String> {
        self.input_descriptors
            .iter()
            .flat_map(InputDescriptor::requested_fields)
            .collect()
    }

    /// Match candidate credentials against the input descriptors.
    ///
    /// Returns, per input descriptor, the indexes of the candidates that satisfy
    /// it. Fails when the matches do not fulfill the definition: every input
    /// descriptor when there are no submission requirements, the requirement
    /// rules otherwise.
    pub fn match_candidates(
        &self,
        candidates: &[Candidate<'_>],
    ) -> Result<MatchedInputs, SubmissionValidationError> {
        let top_level_format = &self.format;

        let by_descriptor: Vec<(String, Vec<usize>)> = self
            .input_descriptors
            .iter()
            .map(|descriptor| {
                let indexes = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| {
                        (!descriptor.format.is_empty()
                            || top_level_format.is_empty()
                            || top_level_format.contains_key(c.format)
                            || (c.format.is_jwt_vc()
                                && top_level_format.keys().any(ClaimFormatDesignation::is_jwt_vc)))
                            && descriptor.matches(c.format, c.claims)
                    })
                    .map(|(i, _)| i)
                    .collect();

                (descriptor.id.clone(), indexes)
            })
            .collect();

        let matches = MatchedInputs { by_descriptor };
        matches.validate(self)?;
        Ok(matches)
    }
}

/// Candidate indexes that satisfy each input descriptor, in definition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedInputs {
    pub by_descriptor: Vec<(String, Vec<usize>)>,
}

impl MatchedInputs {
    fn matched(&self, descriptor_id: &str) -> bool {
        self.by_descriptor
            .iter()
            .any(|(id, indexes)| id == descriptor_id && !indexes.is_empty())
    }

    /// Validate the matches against the presentation definition requirements.
    pub fn validate(
        &self,
        definition: &PresentationDefinition,
    ) -> Result<(), SubmissionValidationError> {
        match definition.submission_requirements() {
            Some(requirements) => {
                for r in requirements {
                    r.validate(definition, self)?
                }
            }
            None => {
                // By default each input descriptor must have at least one
                // associated input.
                for d in definition.input_descriptors() {
                    if !self.matched(&d.id) {
                        return Err(SubmissionValidationError::MissingRequiredInput(
                            d.id.clone(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Indexes of all candidates used by at least one descriptor, ascending.
    pub fn selected(&self) -> Vec<usize> {
        let mut selected: Vec<usize> = self
            .by_descriptor
            .iter()
            .flat_map(|(_, indexes)| indexes.iter().copied())
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SubmissionRequirementObject {
    pub name: Option<String>,
    pub purpose: Option<String>,
    #[serde(flatten)]
    pub property_set: Option<Map<String, Json>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SubmissionRequirementBase {
    From {
        from: GroupId,
        #[serde(flatten)]
        submission_requirement_base: SubmissionRequirementObject,
    },
    FromNested {
        from_nested: Vec<SubmissionRequirement>,
        #[serde(flatten)]
        submission_requirement_base: SubmissionRequirementObject,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SubmissionRequirement {
    All(SubmissionRequirementBase),
    Pick(SubmissionRequirementPick),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SubmissionRequirementPick {
    #[serde(flatten)]
    pub submission_requirement: SubmissionRequirementBase,
    pub count: Option<u64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl SubmissionRequirement {
    fn base(&self) -> &SubmissionRequirementBase {
        match self {
            Self::All(base) => base,
            Self::Pick(pick) => &pick.submission_requirement,
        }
    }

    fn label(&self) -> String {
        match self.base() {
            SubmissionRequirementBase::From { from, .. } => from.clone(),
            SubmissionRequirementBase::FromNested {
                submission_requirement_base,
                ..
            } => submission_requirement_base
                .name
                .clone()
                .unwrap_or_else(|| "from_nested".to_owned()),
        }
    }

    /// Check the rule against the matched inputs.
    pub fn validate(
        &self,
        definition: &PresentationDefinition,
        matches: &MatchedInputs,
    ) -> Result<(), SubmissionValidationError> {
        // Members of the group are either input descriptors or nested rules;
        // count how many are available and how many are satisfied.
        let (total, satisfied) = match self.base() {
            SubmissionRequirementBase::From { from, .. } => {
                let members: Vec<&InputDescriptor> = definition
                    .input_descriptors()
                    .iter()
                    .filter(|d| d.groups().contains(from))
                    .collect();
                let satisfied = members.iter().filter(|d| matches.matched(&d.id)).count();
                (members.len(), satisfied)
            }
            SubmissionRequirementBase::FromNested { from_nested, .. } => {
                let satisfied = from_nested
                    .iter()
                    .filter(|r| r.validate(definition, matches).is_ok())
                    .count();
                (from_nested.len(), satisfied)
            }
        };

        let group = self.label();

        match self {
            Self::All(_) => {
                if satisfied < total {
                    return Err(SubmissionValidationError::SelectionTooSmall {
                        group,
                        min: total,
                        found: satisfied,
                    });
                }
            }
            Self::Pick(pick) => {
                if let Some(count) = pick.count {
                    if satisfied < count as usize {
                        return Err(SubmissionValidationError::SelectionSizeMismatch {
                            group,
                            expected: count as usize,
                            found: satisfied,
                        });
                    }
                }

                if let Some(min) = pick.min {
                    if satisfied < min as usize {
                        return Err(SubmissionValidationError::SelectionTooSmall {
                            group,
                            min: min as usize,
                            found: satisfied,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
