/*
 * Copyright 2021 Google LLC
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

use std::{collections::HashMap, sync::Arc};

/// What is known about one listener resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceVersionRecord {
    /// The last version the control plane sent.
    pub current_version: String,
    /// The last version that was successfully applied.
    pub acked_version: Option<String>,
    /// Content fingerprint of the applied resource.
    pub applied_hash: Option<u64>,
}

/// Keeps track of the versions of every listener resource, shared by the
/// discovery sessions feeding one listener manager.
#[derive(Clone, Debug, Default)]
pub struct VersionStore {
    records: Arc<parking_lot::Mutex<HashMap<String, ResourceVersionRecord>>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ResourceVersionRecord> {
        self.records.lock().get(name).cloned()
    }

    /// Records that the control plane sent `version` of `name`.
    pub fn observe(&self, name: &str, version: &str) {
        self.records
            .lock()
            .entry(name.to_owned())
            .or_default()
            .current_version = version.to_owned();
    }

    /// Records that `version` of `name`, with content `hash`, was applied.
    pub fn applied(&self, name: &str, version: &str, hash: u64) {
        let mut records = self.records.lock();
        let record = records.entry(name.to_owned()).or_default();
        record.current_version = version.to_owned();
        record.acked_version = Some(version.to_owned());
        record.applied_hash = Some(hash);
    }

    /// Whether content `hash` of `name` is already applied.
    pub fn is_applied(&self, name: &str, hash: u64) -> bool {
        self.records
            .lock()
            .get(name)
            .map_or(false, |record| record.applied_hash == Some(hash))
    }

    pub fn remove(&self, name: &str) -> Option<ResourceVersionRecord> {
        self.records.lock().remove(name)
    }

    /// Every known resource name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.records.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// The applied version of every resource, the point an incremental
    /// session resumes from.
    pub fn initial_resource_versions(&self) -> HashMap<String, String> {
        self.records
            .lock()
            .iter()
            .filter_map(|(name, record)| {
                record
                    .acked_version
                    .clone()
                    .map(|version| (name.clone(), version))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
