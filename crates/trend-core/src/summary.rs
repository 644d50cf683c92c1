//! Pure rendering of fetched repository contents into a bounded summary.
//!
//! This is the conversion pipeline's only transformation step: a pure
//! function over already-validated input with no failure mode. Identical
//! input renders byte-identical output.

use crate::defaults::{
    OTHER_FILE_LIST_CAP, README_EXCERPT_MAX, README_TRUNCATION_MARKER, SOURCE_FILE_LIST_CAP,
};
use crate::models::{NewRepo, RepositoryContents};

/// Source-file extensions recognized by the file categorizer.
const SOURCE_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".py", ".go", ".java", ".cpp", ".c", ".rs", ".rb", ".kt", ".swift",
];

/// File-name fragments that mark a documentation file.
const DOC_MARKERS: &[&str] = &["readme", "doc", "changelog", "license", "contributing"];

/// File-name fragments that mark a configuration file.
const CONFIG_MARKERS: &[&str] = &[
    "config", ".json", ".yml", ".yaml", ".toml", "package", "requirements",
];

/// Category buckets for a repository's root file listing.
#[derive(Debug, Default, PartialEq)]
pub struct FileCategories {
    pub documentation: Vec<String>,
    pub configuration: Vec<String>,
    pub source: Vec<String>,
    pub other: Vec<String>,
}

/// Sort a root listing into documentation / configuration / source / other.
/// Directories are skipped; order within a bucket follows the listing.
pub fn categorize_files(contents: &RepositoryContents) -> FileCategories {
    let mut cats = FileCategories::default();
    for file in contents.files.iter().filter(|f| f.is_file()) {
        let lower = file.name.to_lowercase();
        if DOC_MARKERS.iter().any(|m| lower.contains(m)) {
            cats.documentation.push(file.name.clone());
        } else if CONFIG_MARKERS.iter().any(|m| lower.contains(m)) {
            cats.configuration.push(file.name.clone());
        } else if SOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            cats.source.push(file.name.clone());
        } else {
            cats.other.push(file.name.clone());
        }
    }
    cats
}

/// Cap an excerpt at `max` chars, appending the truncation marker when the
/// cap is hit. At the cap, output length is exactly max + marker length.
pub fn truncate_excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str(README_TRUNCATION_MARKER);
    out
}

fn push_capped_list(sections: &mut Vec<String>, heading: &str, names: &[String], cap: usize) {
    if names.is_empty() {
        return;
    }
    sections.push(format!("### {}", heading));
    let truncated = names.len() > cap;
    let mut line = names[..names.len().min(cap)].join(", ");
    if truncated {
        line.push_str(" ...");
    }
    sections.push(line);
}

/// Render repository metadata plus fetched contents into summary text.
///
/// Sections whose underlying sub-fetch came back empty are omitted
/// entirely; a partial fetch yields a partial-but-valid summary.
pub fn render_summary(repo: &NewRepo, contents: &RepositoryContents) -> String {
    let mut sections: Vec<String> = Vec::new();

    // Identity header
    sections.push(format!("# Repository: {}", repo.full_name));
    sections.push(format!("**Owner**: {}", repo.owner));
    sections.push(format!("**Name**: {}", repo.name));
    sections.push(format!("**URL**: {}", repo.url));
    sections.push(format!("**Stars**: {}", repo.stars));
    if let Some(desc) = &repo.description {
        sections.push(format!("**Description**: {}", desc));
    }
    if let Some(lang) = &repo.language {
        sections.push(format!("**Primary Language**: {}", lang));
    }
    sections.push(String::new());

    // Languages ranked by byte-volume share
    if !contents.languages.is_empty() {
        sections.push("## Programming Languages".to_string());
        let total: i64 = contents.languages.values().sum::<i64>().max(1);
        let mut ranked: Vec<(&String, &i64)> = contents.languages.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let line = ranked
            .iter()
            .map(|(lang, bytes)| format!("{}: {:.1}%", lang, (**bytes as f64 / total as f64) * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(line);
        sections.push(String::new());
    }

    // Topics
    if !contents.topics.is_empty() {
        sections.push("## Topics".to_string());
        sections.push(contents.topics.join(", "));
        sections.push(String::new());
    }

    // License
    if let Some(license) = &contents.license {
        sections.push("## License".to_string());
        sections.push(license.clone());
        sections.push(String::new());
    }

    // Project structure
    let cats = categorize_files(contents);
    if contents.files.iter().any(|f| f.is_file()) {
        sections.push("## Project Structure".to_string());
        push_capped_list(
            &mut sections,
            "Documentation Files",
            &cats.documentation,
            SOURCE_FILE_LIST_CAP,
        );
        push_capped_list(
            &mut sections,
            "Configuration Files",
            &cats.configuration,
            SOURCE_FILE_LIST_CAP,
        );
        push_capped_list(&mut sections, "Source Files", &cats.source, SOURCE_FILE_LIST_CAP);
        push_capped_list(&mut sections, "Other Files", &cats.other, OTHER_FILE_LIST_CAP);
        sections.push(String::new());
    }

    // README excerpt
    if let Some(readme) = &contents.readme {
        sections.push("## README Content".to_string());
        sections.push(truncate_excerpt(readme, README_EXCERPT_MAX));
        sections.push(String::new());
    }

    sections.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoFile;

    fn repo() -> NewRepo {
        NewRepo {
            name: "rust".into(),
            owner: "rust-lang".into(),
            full_name: "rust-lang/rust".into(),
            description: Some("Empowering everyone".into()),
            stars: 90000,
            url: "https://github.com/rust-lang/rust".into(),
            language: Some("Rust".into()),
            avatar_url: None,
        }
    }

    fn file(name: &str) -> RepoFile {
        RepoFile {
            name: name.into(),
            path: name.into(),
            size: 100,
            kind: "file".into(),
            download_url: None,
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let contents = RepositoryContents {
            readme: Some("Hello".into()),
            files: vec![file("README.md"), file("main.rs")],
            languages: [("Rust".to_string(), 900i64), ("C".to_string(), 100i64)]
                .into_iter()
                .collect(),
            topics: vec!["systems".into()],
            license: Some("MIT".into()),
        };
        let a = render_summary(&repo(), &contents);
        let b = render_summary(&repo(), &contents);
        assert_eq!(a, b);
    }

    #[test]
    fn test_languages_ranked_by_share() {
        let contents = RepositoryContents {
            languages: [
                ("C".to_string(), 100i64),
                ("Rust".to_string(), 700i64),
                ("Shell".to_string(), 200i64),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let out = render_summary(&repo(), &contents);
        let line = out
            .lines()
            .find(|l| l.contains("%"))
            .expect("language line present");
        assert_eq!(line, "Rust: 70.0%, Shell: 20.0%, C: 10.0%");
    }

    #[test]
    fn test_truncation_law() {
        let long = "x".repeat(README_EXCERPT_MAX + 500);
        let out = truncate_excerpt(&long, README_EXCERPT_MAX);
        assert!(out.ends_with(README_TRUNCATION_MARKER));
        assert_eq!(
            out.chars().count(),
            README_EXCERPT_MAX + README_TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_truncation_noop_below_cap() {
        assert_eq!(truncate_excerpt("short", README_EXCERPT_MAX), "short");
        let exact = "y".repeat(README_EXCERPT_MAX);
        assert_eq!(truncate_excerpt(&exact, README_EXCERPT_MAX), exact);
    }

    #[test]
    fn test_partial_fetch_omits_sections() {
        // Scenario: document fetch failed, only the file listing survived.
        let contents = RepositoryContents {
            readme: None,
            files: vec![file("Cargo.toml"), file("lib.rs")],
            ..Default::default()
        };
        let out = render_summary(&repo(), &contents);
        assert!(out.contains("## Project Structure"));
        assert!(out.contains("Configuration Files"));
        assert!(!out.contains("## README Content"));
        assert!(!out.contains("## Programming Languages"));
        assert!(!out.contains("## License"));
    }

    #[test]
    fn test_categorize_files() {
        let contents = RepositoryContents {
            files: vec![
                file("README.md"),
                file("package.json"),
                file("main.rs"),
                file("logo.png"),
                RepoFile {
                    name: "src".into(),
                    path: "src".into(),
                    size: 0,
                    kind: "dir".into(),
                    download_url: None,
                },
            ],
            ..Default::default()
        };
        let cats = categorize_files(&contents);
        assert_eq!(cats.documentation, vec!["README.md"]);
        assert_eq!(cats.configuration, vec!["package.json"]);
        assert_eq!(cats.source, vec!["main.rs"]);
        assert_eq!(cats.other, vec!["logo.png"]);
    }

    #[test]
    fn test_source_list_capped() {
        let files: Vec<RepoFile> = (0..15).map(|i| file(&format!("mod{i}.rs"))).collect();
        let contents = RepositoryContents {
            files,
            ..Default::default()
        };
        let out = render_summary(&repo(), &contents);
        let line = out
            .lines()
            .skip_while(|l| *l != "### Source Files")
            .nth(1)
            .unwrap();
        assert_eq!(line.matches(".rs").count(), SOURCE_FILE_LIST_CAP);
        assert!(line.ends_with(" ..."));
    }
}
