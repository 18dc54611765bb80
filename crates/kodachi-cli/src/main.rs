// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CLI entry point for `kodachi`.

use anyhow::Result;

fn main() -> Result<()> {
    kodachi_cli::entrypoint()
}
