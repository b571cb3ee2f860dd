pub mod credential_format;
pub mod input_descriptor;
pub mod object;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod util;
