use std::path::{Path, PathBuf};

pub(crate) fn test_data_dir() -> PathBuf {
    let crate_root = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(crate_root).join("test-data")
}

/// The contents of every fenced block tagged `tag` (e.g. "yaml") in a Markdown file,
/// each with the line number of its opening fence.
pub(crate) fn fenced_blocks(tag: &str, file: &Path) -> std::io::Result<Vec<(usize, String)>> {
    let text = std::fs::read_to_string(file)?;
    let fence_start = format!("```{tag}");
    let mut blocks = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for (i, line) in text.lines().enumerate() {
        let line_num = i + 1;
        match current.take() {
            None if line.trim_end() == fence_start => current = Some((line_num, vec![])),
            None => {}
            Some((start, lines)) if line.starts_with("```") => blocks.push((start, lines.join("\n"))),
            Some((start, mut lines)) => {
                lines.push(line);
                current = Some((start, lines));
            }
        }
    }

    if let Some((start, _)) = current {
        let msg = format!("fenced block starting at line {start} was still unclosed at the end of the file");
        return Err(std::io::Error::other(msg));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_readme_config_examples() {
        let readme = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("README.md");
        let blocks = fenced_blocks("yaml", &readme).unwrap();
        assert!(!blocks.is_empty());
        for (line, block) in blocks {
            if let Err(e) = Settings::from_yaml_str(&block) {
                panic!("YAML example at README.md line {line} is not a valid configuration: {e}");
            }
        }
    }
}
