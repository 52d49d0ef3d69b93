/*
 * Copyright 2020 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::config::ValidationError;

/// The discovery stream failed. The session is discarded, whatever it had
/// applied stays in effect until a new session resynchronizes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("discovery stream failed: {0}")]
    Status(#[from] tonic::Status),
    #[error("discovery session is closed")]
    Closed,
}

/// Why a single resource was not applied.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unexpected resource type `{0}`")]
    UnexpectedType(String),
    #[error("resource is named `{actual}` but was sent as `{expected}`")]
    NameMismatch { expected: String, actual: String },
    #[error("resource has no content")]
    Missing,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Upsert(#[from] crate::listener::registry::UpsertError),
}

impl From<prost::DecodeError> for ResourceError {
    fn from(error: prost::DecodeError) -> Self {
        Self::Invalid(error.into())
    }
}
