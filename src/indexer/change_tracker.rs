// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decides what an index run must do: nothing, an incremental patch over
//! changed files, or a full rebuild. Uses git as the change oracle when
//! available; a git failure degrades to per-file content hashing, logged
//! but never fatal.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embedding::content_hash;
use crate::indexer::collect_source_files;
use crate::state::ProjectState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildMode {
	Full,
	Incremental,
	None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildReason {
	NoDatabase,
	NoTracking,
	FilesChanged,
	NoChanges,
	Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMethod {
	Git,
	ContentHash,
}

/// Transient outcome of the pre-build check; computed fresh every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRebuildDecision {
	pub must_rebuild: bool,
	pub mode: RebuildMode,
	pub reason: RebuildReason,
	/// Changed or deleted files, relative to the project root
	pub affected_files: Vec<String>,
	pub tracking_method: TrackingMethod,
	pub current_commit: Option<String>,
}

pub struct ChangeTracker<'a> {
	project_dir: &'a Path,
	config: &'a Config,
}

impl<'a> ChangeTracker<'a> {
	pub fn new(project_dir: &'a Path, config: &'a Config) -> Self {
		Self {
			project_dir,
			config,
		}
	}

	/// Compute the rebuild decision from persisted state and store content.
	pub async fn decide_rebuild(
		&self,
		state: Option<&ProjectState>,
		store_count: usize,
		force: bool,
	) -> IndexRebuildDecision {
		let current_commit = self.current_commit().await.ok();
		let tracking_method = if current_commit.is_some() {
			TrackingMethod::Git
		} else {
			TrackingMethod::ContentHash
		};

		if force {
			return IndexRebuildDecision {
				must_rebuild: true,
				mode: RebuildMode::Full,
				reason: RebuildReason::Forced,
				affected_files: Vec::new(),
				tracking_method,
				current_commit,
			};
		}

		if store_count == 0 {
			return IndexRebuildDecision {
				must_rebuild: true,
				mode: RebuildMode::Full,
				reason: RebuildReason::NoDatabase,
				affected_files: Vec::new(),
				tracking_method,
				current_commit,
			};
		}

		let state = match state {
			Some(s) if !s.files.is_empty() => s,
			_ => {
				return IndexRebuildDecision {
					must_rebuild: true,
					mode: RebuildMode::Full,
					reason: RebuildReason::NoTracking,
					affected_files: Vec::new(),
					tracking_method,
					current_commit,
				}
			}
		};

		let (mut affected, tracking_method) = match self.git_changed_files(state).await {
			Ok(changed) => (changed, TrackingMethod::Git),
			Err(e) => {
				warn!("Change oracle unavailable, falling back to content hashing: {e:#}");
				(self.hash_changed_files(state), TrackingMethod::ContentHash)
			}
		};

		// Files that vanished from disk still need retraction
		for tracked in state.files.keys() {
			if !self.project_dir.join(tracked).exists() {
				affected.insert(tracked.clone());
			}
		}

		let affected_files: Vec<String> = affected.into_iter().collect();
		if affected_files.is_empty() {
			IndexRebuildDecision {
				must_rebuild: false,
				mode: RebuildMode::None,
				reason: RebuildReason::NoChanges,
				affected_files,
				tracking_method,
				current_commit,
			}
		} else {
			IndexRebuildDecision {
				must_rebuild: true,
				mode: RebuildMode::Incremental,
				reason: RebuildReason::FilesChanged,
				affected_files,
				tracking_method,
				current_commit,
			}
		}
	}

	/// Union of committed changes since the last indexed revision and
	/// uncommitted working-tree changes, filtered to source extensions.
	async fn git_changed_files(&self, state: &ProjectState) -> Result<BTreeSet<String>> {
		let mut changed = BTreeSet::new();

		if let Some(last_commit) = &state.last_commit {
			let diff = self
				.git(&["diff", "--name-only", &format!("{last_commit}..HEAD")])
				.await?;
			for line in diff.lines() {
				let path = line.trim();
				if !path.is_empty() && self.config.matches_extension(Path::new(path)) {
					changed.insert(path.to_string());
				}
			}
		} else {
			// Tracked files but no recorded revision: treat every source
			// file as changed, git still validates reachability
			self.git(&["rev-parse", "HEAD"]).await?;
			for path in collect_source_files(self.project_dir, self.config) {
				changed.insert(path);
			}
		}

		// git status --porcelain covers staged, unstaged and untracked
		let status = self.git(&["status", "--porcelain"]).await?;
		for line in status.lines() {
			if line.len() <= 3 {
				continue;
			}
			let path = line[3..].trim();
			// Renames come through as "old -> new"
			let path = path.split(" -> ").last().unwrap_or(path);
			if self.config.matches_extension(Path::new(path)) {
				changed.insert(path.to_string());
			}
		}

		debug!("Change oracle reported {} changed files", changed.len());
		Ok(changed)
	}

	/// Fallback: compare stored content hashes against fresh ones. New
	/// files (no record) always count as changed.
	fn hash_changed_files(&self, state: &ProjectState) -> BTreeSet<String> {
		let mut changed = BTreeSet::new();
		for relative in collect_source_files(self.project_dir, self.config) {
			let absolute = self.project_dir.join(&relative);
			let fresh = match std::fs::read(&absolute) {
				Ok(bytes) => content_hash(&bytes),
				Err(e) => {
					warn!("Failed to hash {relative}: {e}");
					continue;
				}
			};
			match state.files.get(&relative) {
				Some(record) if record.content_hash == fresh => {}
				_ => {
					changed.insert(relative);
				}
			}
		}
		changed
	}

	pub async fn current_commit(&self) -> Result<String> {
		let output = self.git(&["rev-parse", "HEAD"]).await?;
		let commit = output.trim().to_string();
		if commit.is_empty() {
			return Err(anyhow!("git returned an empty revision"));
		}
		Ok(commit)
	}

	async fn git(&self, args: &[&str]) -> Result<String> {
		let output = Command::new("git")
			.args(args)
			.current_dir(self.project_dir)
			.output()
			.await
			.map_err(|e| anyhow!("Failed to run git: {e}"))?;
		if !output.status.success() {
			return Err(anyhow!(
				"git {} failed: {}",
				args.join(" "),
				String::from_utf8_lossy(&output.stderr).trim()
			));
		}
		Ok(String::from_utf8_lossy(&output.stdout).to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use std::path::PathBuf;

	fn temp_project(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!(
			"codeatlas-tracker-test-{tag}-{}",
			std::process::id()
		));
		let _ = fs::remove_dir_all(&dir);
		fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[tokio::test]
	async fn empty_store_forces_full_rebuild() {
		let project = temp_project("nodb");
		let config = Config::default();
		let tracker = ChangeTracker::new(&project, &config);
		let decision = tracker.decide_rebuild(None, 0, false).await;
		assert!(decision.must_rebuild);
		assert_eq!(decision.mode, RebuildMode::Full);
		assert_eq!(decision.reason, RebuildReason::NoDatabase);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn missing_tracking_forces_full_rebuild() {
		let project = temp_project("notrack");
		let config = Config::default();
		let tracker = ChangeTracker::new(&project, &config);
		let decision = tracker.decide_rebuild(None, 5, false).await;
		assert_eq!(decision.reason, RebuildReason::NoTracking);
		assert_eq!(decision.mode, RebuildMode::Full);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn force_flag_wins_over_everything() {
		let project = temp_project("force");
		let config = Config::default();
		let mut state = ProjectState::default();
		state.record_file("a.py", "hash".to_string());
		let tracker = ChangeTracker::new(&project, &config);
		let decision = tracker.decide_rebuild(Some(&state), 5, true).await;
		assert_eq!(decision.reason, RebuildReason::Forced);
		assert_eq!(decision.mode, RebuildMode::Full);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn hash_fallback_detects_edits_and_reports_no_changes() {
		// Not a git repository, so the tracker must fall back to hashing
		let project = temp_project("hash");
		let file = project.join("a.py");
		fs::write(&file, "def foo():\n    return 1\n").unwrap();

		let config = Config::default();
		let mut state = ProjectState::default();
		state.record_file("a.py", content_hash(&fs::read(&file).unwrap()));

		let tracker = ChangeTracker::new(&project, &config);
		let unchanged = tracker.decide_rebuild(Some(&state), 5, false).await;
		assert!(!unchanged.must_rebuild);
		assert_eq!(unchanged.reason, RebuildReason::NoChanges);

		fs::write(&file, "def foo():\n    return 2\n").unwrap();
		let changed = tracker.decide_rebuild(Some(&state), 5, false).await;
		assert!(changed.must_rebuild);
		assert_eq!(changed.mode, RebuildMode::Incremental);
		assert_eq!(changed.affected_files, vec!["a.py".to_string()]);
		let _ = fs::remove_dir_all(&project);
	}

	#[tokio::test]
	async fn deleted_files_appear_in_affected_set() {
		let project = temp_project("deleted");
		let config = Config::default();
		let mut state = ProjectState::default();
		state.record_file("gone.py", "stale-hash".to_string());

		let tracker = ChangeTracker::new(&project, &config);
		let decision = tracker.decide_rebuild(Some(&state), 5, false).await;
		assert!(decision.must_rebuild);
		assert!(decision
			.affected_files
			.contains(&"gone.py".to_string()));
		let _ = fs::remove_dir_all(&project);
	}
}
