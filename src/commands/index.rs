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

use anyhow::Result;
use clap::Args;
use codeatlas::config::Config;
use codeatlas::indexer;
use std::path::Path;

#[derive(Args)]
pub struct IndexArgs {
	/// Rebuild from scratch even when tracking reports no changes
	#[arg(long)]
	pub force: bool,

	/// Suppress the build summary
	#[arg(long)]
	pub quiet: bool,
}

pub async fn execute(project_dir: &Path, config: &Config, args: &IndexArgs) -> Result<()> {
	let report = indexer::build(project_dir, config, args.force).await?;

	if args.quiet {
		return Ok(());
	}

	match report.mode {
		None => println!("Index is up to date, nothing to do."),
		Some(mode) => {
			println!(
				"Indexed {} file(s) into {} fragment(s) in {:.1}s ({:?} rebuild)",
				report.files_processed,
				report.fragments_created,
				report.elapsed.as_secs_f32(),
				mode
			);
			if report.files_removed > 0 {
				println!("Removed {} deleted file(s) from the index", report.files_removed);
			}
			if report.duplicates_skipped > 0 {
				println!("Skipped {} duplicate fragment(s)", report.duplicates_skipped);
			}
			if report.anchorless_fragments > 0 {
				println!(
					"{} fragment(s) had no semantic anchors and were indexed by content only",
					report.anchorless_fragments
				);
			}
		}
	}

	if report.had_errors() {
		for (file, error) in &report.file_errors {
			eprintln!("Warning: failed to process {file}: {error}");
		}
		for file in &report.unindexed_files {
			eprintln!("Warning: embeddings failed for {file}; it will be retried next run");
		}
	}

	Ok(())
}
