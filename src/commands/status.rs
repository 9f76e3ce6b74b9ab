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
pub struct StatusArgs {
	/// Emit the status as JSON
	#[arg(long)]
	pub json: bool,
}

pub async fn execute(project_dir: &Path, config: &Config, args: &StatusArgs) -> Result<()> {
	let report = indexer::status(project_dir, config).await?;

	if args.json {
		println!("{}", serde_json::to_string_pretty(&report)?);
		return Ok(());
	}

	println!("index: {:?}", report.lifecycle);
	if let Some(model) = &report.embedding_model {
		println!("embedding model: {model}");
	}
	println!("tracked files: {}", report.tracked_files);
	println!("fragments: {}", report.fragment_count);
	println!(
		"graph: {} symbols, {} edges ({} calls, {} inheritance), {} pattern instances",
		report.graph.symbol_count,
		report.graph.edge_count,
		report.graph.call_edge_count,
		report.graph.inheritance_edge_count,
		report.graph.pattern_instance_count
	);
	if report.decision.must_rebuild {
		println!(
			"pending: {:?} rebuild ({:?}), {} affected file(s)",
			report.decision.mode,
			report.decision.reason,
			report.decision.affected_files.len()
		);
	} else {
		println!("pending: none, index is current");
	}
	println!("tracking: {:?}", report.decision.tracking_method);

	Ok(())
}
