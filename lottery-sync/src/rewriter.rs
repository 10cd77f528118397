// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Single-value substitution in text files.
//!
//! A pattern locates one line of a foreign file (a dotenv entry, a YAML key, a
//! line of TypeScript) and its first capture group marks the value to replace.
//! Everything else in the file is kept as is, including line endings.

use crate::error::{AmbiguousMatchSnafu, IoSnafu, RewriteError};
use async_std::{
    fs::{self, File},
    io::{BufReadExt, BufReader},
};
use regex::Regex;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// What a rewrite did to the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The value on this (1-based) line was replaced.
    Updated { line: usize },
    /// The line already held the value, the file was not written.
    Unchanged { line: usize },
    /// No line matched, the file was not written.
    NoMatch,
}

/// Replace the value captured by `pattern` in the single matching line of the
/// file at `path` with `replacement`.
///
/// The replacement is inserted literally, `$` has no special meaning.
pub async fn rewrite(
    path: &Path,
    pattern: &Regex,
    replacement: &str,
) -> Result<RewriteOutcome, RewriteError> {
    let file = File::open(path).await.context(IoSnafu { path })?;
    let mut reader = BufReader::new(file);

    let mut contents = String::new();
    let mut matches = vec![];
    let mut changed = false;
    let mut line = String::new();
    let mut number = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line).await.context(IoSnafu { path })? == 0 {
            break;
        }
        number += 1;

        let (body, ending) = split_line_ending(&line);
        match substitute(pattern, body, replacement) {
            Some(new_body) => {
                matches.push(number);
                changed |= new_body != body;
                contents.push_str(&new_body);
                contents.push_str(ending);
            }
            None => contents.push_str(&line),
        }
    }

    match matches.as_slice() {
        [] => {
            tracing::info!(
                "No line of {} matches `{}`, leaving it unchanged",
                path.display(),
                pattern
            );
            Ok(RewriteOutcome::NoMatch)
        }
        [line] if !changed => Ok(RewriteOutcome::Unchanged { line: *line }),
        [line] => {
            if !contents.ends_with('\n') {
                contents.push('\n');
            }
            write_atomic(path, &contents).await?;
            Ok(RewriteOutcome::Updated { line: *line })
        }
        _ => AmbiguousMatchSnafu {
            path,
            lines: matches.clone(),
        }
        .fail(),
    }
}

/// Replace the span of the first capture group, or of the whole match if the
/// group did not participate.
fn substitute(pattern: &Regex, line: &str, replacement: &str) -> Option<String> {
    let captures = pattern.captures(line)?;
    let span = captures.get(1).or_else(|| captures.get(0))?;
    Some(format!(
        "{}{}{}",
        &line[..span.start()],
        replacement,
        &line[span.end()..]
    ))
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Replace the content of `path` as a whole.
///
/// The new content goes to a sibling file first and is then renamed over the
/// target, so readers see either the old or the new file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), RewriteError> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)
        .await
        .context(IoSnafu { path: &tmp })?;
    if let Err(err) = fs::rename(&tmp, path).await {
        fs::remove_file(&tmp).await.ok();
        return Err(err).context(IoSnafu { path });
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.sync"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ADDRESS_PATTERN, START_BLOCK_PATTERN};

    const NEW_ADDRESS: &str = "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01";

    fn env_pattern() -> Regex {
        Regex::new(&format!("LOTTERY_ADDRESS={ADDRESS_PATTERN}")).unwrap()
    }

    #[async_std::test]
    async fn test_address_propagation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(
            &path,
            "PORT=3000\nLOTTERY_ADDRESS=0x0000000000000000000000000000000000000000\nDEBUG=true\n",
        )
        .unwrap();

        let outcome = rewrite(&path, &env_pattern(), NEW_ADDRESS).await.unwrap();
        assert_eq!(outcome, RewriteOutcome::Updated { line: 2 });
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("PORT=3000\nLOTTERY_ADDRESS={NEW_ADDRESS}\nDEBUG=true\n")
        );
    }

    #[async_std::test]
    async fn test_start_block_propagation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subgraph.yaml");
        std::fs::write(
            &path,
            "dataSources:\n  - kind: ethereum\n    source:\n  startBlock: 0\n",
        )
        .unwrap();

        let pattern = Regex::new(&format!(r"\s+startBlock: {START_BLOCK_PATTERN}")).unwrap();
        rewrite(&path, &pattern, "12345").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "dataSources:\n  - kind: ethereum\n    source:\n  startBlock: 12345\n"
        );
    }

    #[async_std::test]
    async fn test_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.env");
        std::fs::write(
            &path,
            "LOTTERY_ADDRESS=0x0000000000000000000000000000000000000000",
        )
        .unwrap();

        rewrite(&path, &env_pattern(), NEW_ADDRESS).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        let outcome = rewrite(&path, &env_pattern(), NEW_ADDRESS).await.unwrap();
        assert_eq!(outcome, RewriteOutcome::Unchanged { line: 1 });
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[async_std::test]
    async fn test_no_match_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contracts.ts");
        // No trailing newline, which a rewrite would add.
        let original = "export const contracts = {\r\n  lottery: {},\r\n}";
        std::fs::write(&path, original).unwrap();

        let outcome = rewrite(&path, &env_pattern(), NEW_ADDRESS).await.unwrap();
        assert_eq!(outcome, RewriteOutcome::NoMatch);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[async_std::test]
    async fn test_preserves_line_endings_and_adds_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contracts.ts");
        std::fs::write(
            &path,
            "export const lottery = {\r\n  [ChainId.KLAYTN_TESTNET]: '0x0000000000000000000000000000000000000000',\r\n}",
        )
        .unwrap();

        let pattern = Regex::new(&format!(
            r"\s+\[ChainId\.KLAYTN_TESTNET\]: '{ADDRESS_PATTERN}',"
        ))
        .unwrap();
        rewrite(&path, &pattern, NEW_ADDRESS).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("export const lottery = {{\r\n  [ChainId.KLAYTN_TESTNET]: '{NEW_ADDRESS}',\r\n}}\n")
        );
    }

    #[async_std::test]
    async fn test_replacement_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.env");
        std::fs::write(&path, "VALUE=old\n").unwrap();

        let pattern = Regex::new(r"VALUE=(\w+)").unwrap();
        rewrite(&path, &pattern, "$1${0}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "VALUE=$1${0}\n");
    }

    #[async_std::test]
    async fn test_ambiguous_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.env");
        let original = "LOTTERY_ADDRESS=0x0000000000000000000000000000000000000000\nLOTTERY_ADDRESS=0x0000000000000000000000000000000000000001\n";
        std::fs::write(&path, original).unwrap();

        let err = rewrite(&path, &env_pattern(), NEW_ADDRESS)
            .await
            .unwrap_err();
        assert!(
            matches!(err, RewriteError::AmbiguousMatch { ref lines, .. } if lines == &[1, 2])
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[async_std::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = rewrite(&dir.path().join("missing.env"), &env_pattern(), NEW_ADDRESS)
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::Io { .. }));
    }
}
