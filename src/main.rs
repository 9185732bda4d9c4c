//! # anime-ident CLI
//!
//! Command-line interface for the anime file identifier.
//!
//! ## Usage
//! ```bash
//! anime-ident identify ~/Downloads/anime --test-mode
//! anime-ident identify ep01.mkv --output json
//! anime-ident watch ~/Downloads/complete
//! anime-ident db list
//! ```

mod cli;

use anime_identifier::Result;

fn main() -> Result<()> {
    cli::run()
}
