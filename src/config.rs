//! Parses argv into a [`Config`]. The core never touches `std::env` directly;
//! `main` builds a `Config` and hands it to `lib::run`.

use clap::{App, Arg};
use std::path::PathBuf;

#[derive(Debug, PartialEq)]
pub struct Config {
    pub images: Vec<PathBuf>,
    pub verbosity: u64,
}

impl Config {
    /// Parses the process's own `argv`. The `IMAGE` positional is left
    /// optional here rather than `required(true)`: a `required` arg makes
    /// clap exit the process with its own exit code 1 on "none given",
    /// which would make spec.md §6's "exit code 2 if no image file is
    /// supplied" unreachable. An empty `images` is a well-formed `Config`;
    /// `lib::run` is what turns it into `VmError::NoImage`.
    pub fn from_args() -> Self {
        let matches = App::new("lc3")
            .about("An LC-3 virtual machine")
            .arg(
                Arg::with_name("IMAGE")
                    .help("Image file(s) to load, later ones overlaying earlier ones")
                    .required(false)
                    .multiple(true)
                    .index(1),
            )
            .arg(
                Arg::with_name("verbose")
                    .short("v")
                    .long("verbose")
                    .multiple(true)
                    .help("Increases log verbosity (-v info, -vv debug, -vvv trace)"),
            )
            .get_matches();

        Self::from_matches(&matches)
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        let images = matches
            .values_of("IMAGE")
            .into_iter()
            .flatten()
            .map(PathBuf::from)
            .collect();

        Self {
            images,
            verbosity: u64::from(matches.occurrences_of("verbose")),
        }
    }
}
