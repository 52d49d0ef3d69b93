/*
 * Copyright 2020 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *       http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("{field} has invalid value{clarification}{examples}",
    clarification = clarification
                    .as_ref()
                    .map(|v| format!(": {}", v))
                    .unwrap_or_default(),
    examples = examples
                    .as_ref()
                    .map(|v| format!(": {}", v.join(", ")))
                    .unwrap_or_default(),

    )]
pub struct ValueInvalidArgs {
    pub field: String,
    pub clarification: Option<String>,
    pub examples: Option<Vec<String>>,
}

impl ValueInvalidArgs {
    pub fn new(field: impl Into<String>, clarification: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            clarification: Some(clarification.into()),
            examples: None,
        }
    }
}

/// Validation failure for a listener resource. A resource failing validation
/// is rejected and reported back to the control plane, it is never applied.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener has no address")]
    MissingAddress,
    #[error("address `{0}` is not a valid IP address")]
    InvalidAddress(String),
    #[error("{field} `{value}` is not a valid port")]
    InvalidPort { field: &'static str, value: u32 },
    #[error("`{prefix}/{len}` is not a valid CIDR range")]
    InvalidCidr { prefix: String, len: u32 },
    #[error("server name `{0}` is not an exact name or a `*.` wildcard")]
    InvalidServerName(String),
    #[error("listener filter `{0}` is not registered")]
    UnknownListenerFilter(String),
    #[error("failed to decode resource: {0}")]
    Decode(String),
    #[error("field {0} is not unique")]
    NotUnique(String),
    #[error(transparent)]
    ValueInvalid(#[from] ValueInvalidArgs),
}

impl From<prost::DecodeError> for ValidationError {
    fn from(error: prost::DecodeError) -> Self {
        Self::Decode(error.to_string())
    }
}
