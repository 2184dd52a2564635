//! File selection: flags or an interactive checklist grouped by file class

use crate::output::format_bytes;
use anyhow::{bail, Result};
use console::Term;
use dialoguer::MultiSelect;
use hfmd_types::{FileClass, FileDescriptor};

/// How the files of a download are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Case-insensitive substrings matched against the repository path
    Include(Vec<String>),
    Interactive,
}

impl Selection {
    pub fn from_flags(all: bool, include: Vec<String>) -> Self {
        if all {
            Selection::All
        } else if !include.is_empty() {
            Selection::Include(include)
        } else {
            Selection::Interactive
        }
    }

    /// Pick the files to download; an empty result means nothing was chosen
    pub fn apply(&self, files: &[FileDescriptor]) -> Result<Vec<FileDescriptor>> {
        let files = files.iter().filter(|f| f.is_file());
        match self {
            Selection::All => Ok(files.cloned().collect()),
            Selection::Include(patterns) => {
                let patterns: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
                Ok(files
                    .filter(|f| {
                        let path = f.path.to_lowercase();
                        patterns.iter().any(|p| path.contains(p))
                    })
                    .cloned()
                    .collect())
            }
            Selection::Interactive => choose(&files.cloned().collect::<Vec<_>>()),
        }
    }
}

/// One checklist row
struct Choice<'a> {
    label: String,
    file: &'a FileDescriptor,
    checked: bool,
}

/// Rows ordered by class then path; small support files start checked
fn choices(files: &[FileDescriptor]) -> Vec<Choice<'_>> {
    let mut sorted: Vec<&FileDescriptor> = files.iter().collect();
    sorted.sort_by(|a, b| a.class().cmp(&b.class()).then_with(|| a.path.cmp(&b.path)));

    sorted
        .into_iter()
        .map(|file| {
            let class = file.class();
            let size = file
                .size
                .map(format_bytes)
                .unwrap_or_else(|| "?".to_string());
            Choice {
                label: format!("[{:<9}] {} ({})", class.label(), file.path, size),
                file,
                checked: matches!(class, FileClass::Config | FileClass::Tokenizer),
            }
        })
        .collect()
}

fn choose(files: &[FileDescriptor]) -> Result<Vec<FileDescriptor>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let term = Term::stderr();
    if !term.is_term() {
        bail!("No terminal available for interactive selection; use --all or --include");
    }

    let choices = choices(files);
    let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
    let defaults: Vec<bool> = choices.iter().map(|c| c.checked).collect();

    let picked = MultiSelect::new()
        .with_prompt("Select files to download (space toggles, enter confirms)")
        .items(&labels)
        .defaults(&defaults)
        .max_length(20)
        .interact_on_opt(&term)?;

    Ok(picked
        .unwrap_or_default()
        .into_iter()
        .map(|i| choices[i].file.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfmd_types::EntryKind;

    fn files() -> Vec<FileDescriptor> {
        vec![
            FileDescriptor::file("README.md", "a", 10),
            FileDescriptor::file("model.safetensors", "b", 5_000_000),
            FileDescriptor::file("onnx/model.onnx", "c", 4_000_000),
            FileDescriptor::file("config.json", "d", 600),
            FileDescriptor::file("tokenizer.json", "e", 700_000),
            FileDescriptor {
                path: "onnx".to_string(),
                content_id: String::new(),
                size: None,
                kind: EntryKind::Directory,
            },
        ]
    }

    #[test]
    fn flags_pick_the_mode() {
        assert_eq!(Selection::from_flags(true, vec![]), Selection::All);
        assert_eq!(
            Selection::from_flags(false, vec!["onnx".into()]),
            Selection::Include(vec!["onnx".into()])
        );
        assert_eq!(Selection::from_flags(false, vec![]), Selection::Interactive);
    }

    #[test]
    fn all_skips_directories() {
        let picked = Selection::All.apply(&files()).unwrap();
        assert_eq!(picked.len(), 5);
        assert!(picked.iter().all(|f| f.is_file()));
    }

    #[test]
    fn include_matches_any_pattern_ignoring_case() {
        let selection = Selection::Include(vec!["ONNX".into(), "config".into()]);
        let picked: Vec<String> = selection
            .apply(&files())
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(picked, vec!["onnx/model.onnx", "config.json"]);
    }

    #[test]
    fn choices_are_grouped_by_class() {
        let files: Vec<FileDescriptor> = files().into_iter().filter(|f| f.is_file()).collect();
        let rows = choices(&files);
        let order: Vec<&str> = rows.iter().map(|c| c.file.path.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "model.safetensors",
                "onnx/model.onnx",
                "tokenizer.json",
                "config.json",
                "README.md"
            ]
        );
        let checked: Vec<&str> = rows
            .iter()
            .filter(|c| c.checked)
            .map(|c| c.file.path.as_str())
            .collect();
        assert_eq!(checked, vec!["tokenizer.json", "config.json"]);
        assert!(rows[0].label.starts_with("[Weights  ] model.safetensors"));
    }
}
