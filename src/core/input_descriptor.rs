use std::collections::HashSet;

use super::credential_format::*;
use crate::utils::NonEmptyVec;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath as CompiledPath;
use tracing::debug;

/// A GroupId represents a unique identifier for a group of Input Descriptors.
///
/// This type is also used by the submission requirements to group input descriptors.
pub type GroupId = String;

/// A JSONPath is a string that represents a path to a specific value within a JSON object.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type JsonPath = String;

/// The predicate Feature introduces properties enabling Verifier to request that Holder apply a predicate and return the result.
///
/// See: [https://identity.foundation/presentation-exchange/#predicate-feature](https://identity.foundation/presentation-exchange/#predicate-feature)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum Predicate {
    #[serde(rename = "required")]
    Required,
    #[serde(rename = "preferred")]
    Preferred,
}

/// Input Descriptors describe the information a Verifier requires of a Holder.
///
/// All Input Descriptors MUST be satisfied, unless otherwise specified by the
/// submission requirements of the enclosing presentation definition.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    pub(crate) format: ClaimFormatMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    group: Vec<GroupId>,
}

impl InputDescriptor {
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
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

    /// The purpose for which the claim's data is being requested.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Constrain submission of this input to a subset of formats.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    pub fn format_designations(&self) -> HashSet<&ClaimFormatDesignation> {
        self.format.keys().collect()
    }

    pub fn set_group(mut self, group: Vec<GroupId>) -> Self {
        self.group = group;
        self
    }

    pub fn groups(&self) -> &Vec<GroupId> {
        self.group.as_ref()
    }

    /// Whether a credential of the given format may be submitted for this input.
    ///
    /// An empty format map accepts every format. The JWT credential
    /// designations (`jwt_vc`, `jwt_vc_json`, `jwt_vc_json-ld`) are treated as
    /// interchangeable since verifiers use them loosely.
    pub fn accepts_format(&self, format: &ClaimFormatDesignation) -> bool {
        if self.format.is_empty() || self.format.contains_key(format) {
            return true;
        }

        format.is_jwt_vc() && self.format.keys().any(ClaimFormatDesignation::is_jwt_vc)
    }

    /// Whether the credential, in its JSON form, satisfies this input descriptor.
    pub fn matches(&self, format: &ClaimFormatDesignation, credential: &Json) -> bool {
        if !self.accepts_format(format) {
            debug!(descriptor = %self.id, %format, "credential format not accepted");
            return false;
        }

        self.constraints.matches(credential)
    }

    /// The requested field names, without their JSON path prefix.
    pub fn requested_fields(&self) -> Vec<String> {
        self.constraints()
            .fields()
            .iter()
            .flat_map(|field| field.requested_fields())
            .collect()
    }
}

/// Constraints a Holder must satisfy to fulfill an Input Descriptor.
///
/// A constraint object MAY be empty, or it may include a `fields` and/or `limit_disclosure` property.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    pub fn set_limit_disclosure(mut self, limit_disclosure: ConstraintsLimitDisclosure) -> Self {
        self.limit_disclosure = Some(limit_disclosure);
        self
    }

    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns if the constraints fields contain non-optional
    /// fields that must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }

    /// Every required field must match. Optional fields only need to pass their
    /// filter when present.
    pub fn matches(&self, credential: &Json) -> bool {
        self.fields.iter().all(|field| field.matches(credential))
    }
}

/// ConstraintsField objects describe a single claim constraint of an Input Descriptor.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicate: Option<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
    #[serde(default)]
    intent_to_retain: bool,
}

impl From<NonEmptyVec<JsonPath>> for ConstraintsField {
    fn from(path: NonEmptyVec<JsonPath>) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}

impl ConstraintsField {
    pub fn new(path: JsonPath) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path),
            ..Default::default()
        }
    }

    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    pub fn set_id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// JSON Schema applied to the values selected by `path`.
    pub fn set_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter(&self) -> Option<&Json> {
        self.filter.as_ref()
    }

    pub fn set_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    pub fn set_retained(mut self, intent_to_retain: bool) -> Self {
        self.intent_to_retain = intent_to_retain;
        self
    }

    pub fn intent_to_retain(&self) -> bool {
        self.intent_to_retain
    }

    /// Evaluate the field against a credential.
    ///
    /// Paths are tried in order; the first path selecting at least one value
    /// decides the outcome. With a filter, one of the selected values must
    /// validate against it. When no path selects anything, the field matches
    /// only if it is optional.
    pub fn matches(&self, credential: &Json) -> bool {
        let validator = match self.filter.as_ref().map(JSONSchema::compile) {
            None => None,
            Some(Ok(validator)) => Some(validator),
            Some(Err(e)) => {
                debug!("invalid filter in constraints field: {e}");
                return false;
            }
        };

        for path in self.path.iter() {
            let compiled = match CompiledPath::parse(path) {
                Ok(compiled) => compiled,
                Err(e) => {
                    debug!(%path, "invalid JSONPath in constraints field: {e}");
                    continue;
                }
            };

            let nodes = compiled.query(credential).all();
            if nodes.is_empty() {
                // > If the result returned no JSONPath match, skip to the next path array element.
                continue;
            }

            return match &validator {
                None => true,
                Some(validator) => nodes.iter().any(|node| validator.is_valid(node)),
            };
        }

        self.is_optional()
    }

    /// The requested field in the format specified in the constraints field,
    /// e.g. `$.credentialSubject.dateOfBirth` yields `dateOfBirth`.
    pub fn requested_fields(&self) -> Vec<String> {
        self.path()
            .iter()
            .filter_map(|path| path.split(&['-', '.', ':', '@'][..]).last())
            .map(|field| field.trim_end_matches(['\'', ']']).to_owned())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}
