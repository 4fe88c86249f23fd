use std::fs::File;
use std::io::Read;
use std::path::Path;

use bstr::{BStr, ByteSlice};
use nom::branch::alt;
use nom::bytes::complete::escaped;
use nom::character::complete::{char, none_of, one_of, space1};
use nom::combinator::{cut, map, opt};
use nom::multi::separated_list0;
use nom::sequence::{preceded, terminated, tuple};

use crate::common::parser::{consume_all, p_u64, NomResult};

const MAX_PREFIX_OF_SCRIPT: usize = 32 * 1024; // 32KiB

const SBATCH_DIRECTIVE: &[u8] = b"#SBATCH";

fn p_double_quoted(input: &str) -> NomResult<&str> {
    preceded(
        char('"'),
        cut(terminated(
            escaped(none_of("\"\\"), '\\', one_of("\"")),
            char('"'),
        )),
    )(input)
}

fn p_arg(input: &str) -> NomResult<String> {
    alt((
        map(p_double_quoted, |s| s.to_string()),
        map(
            tuple((
                escaped(none_of(" \t\"\\"), '\\', one_of(" \"")),
                opt(p_double_quoted),
            )),
            |pair| match pair {
                (a, None) => a.to_string(),
                (a, Some(b)) => {
                    let mut s = a.to_string();
                    s.push_str(b);
                    s
                }
            },
        ),
    ))(input)
}

fn parse_args(input: &str) -> anyhow::Result<Vec<String>> {
    consume_all(separated_list0(space1, p_arg), input)
}

/// Returns the content of `#SBATCH` directives from the leading comment block of a script.
/// Like `sbatch`, stops at the first line that is neither empty nor a comment.
fn extract_directives(data: &BStr) -> Vec<String> {
    let mut directives = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(SBATCH_DIRECTIVE) {
            if rest.first().is_some_and(|c| c.is_ascii_whitespace()) {
                let value = rest.trim();
                if !value.is_empty() {
                    directives.push(value.to_str_lossy().into_owned());
                }
                continue;
            }
        }
        match line.first() {
            Some(b'#') | None => continue,
            _ => break,
        }
    }
    directives
}

/// Finds the number of CPUs that a single array task requests.
/// The last occurrence wins, as it does with `sbatch`.
pub fn parse_units_per_task(data: &[u8]) -> Option<u64> {
    let mut units = None;
    for directive in extract_directives(data.as_bstr()) {
        let args = match parse_args(&directive) {
            Ok(args) => args,
            Err(error) => {
                log::debug!("Cannot parse directive `#SBATCH {directive}`: {error:?}");
                continue;
            }
        };
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let value = if let Some(value) = arg.strip_prefix("--cpus-per-task=") {
                Some(value)
            } else if arg == "--cpus-per-task" || arg == "-c" {
                iter.next().map(|s| s.as_str())
            } else if let Some(value) = arg.strip_prefix("-c").filter(|v| !v.is_empty()) {
                Some(value)
            } else {
                None
            };
            let Some(value) = value else { continue };
            match consume_all(p_u64, value) {
                Ok(0) | Err(_) => {
                    log::warn!("Ignoring invalid CPU count `{value}` in template directive");
                }
                Ok(count) => units = Some(count),
            }
        }
    }
    units
}

/// Reads the per-task CPU request from the `#SBATCH` header of the job template.
pub fn discover_units_per_task(path: &Path) -> anyhow::Result<Option<u64>> {
    log::debug!("Extracting directives from template: {}", path.display());

    let f = File::open(path)?;
    let mut buffer = Vec::with_capacity(MAX_PREFIX_OF_SCRIPT);
    f.take(MAX_PREFIX_OF_SCRIPT as u64).read_to_end(&mut buffer)?;
    Ok(parse_units_per_task(&buffer))
}
