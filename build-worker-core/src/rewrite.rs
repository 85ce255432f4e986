//! # rewrite: turn root-relative asset references into document-relative ones
//!
//! Build toolchains usually assume deployment at a domain root and emit references like
//! `src="/app.js"`. Outputs here are served under a per-project prefix, so those have to
//! become `./app.js` before the tree is uploaded.
//!
//! Only two narrow patterns are touched:
//! - `href="/X"` and `src="/X"` attributes in the entry markup document.
//! - Quoted string literals holding a root-relative image path in scripts under the
//!   assets directory.
//!
//! Matching is anchored regex, not parsing. That is a precision/cost tradeoff: it is
//! exact for what bundlers emit and makes no promise about adversarial input.
//!
//! Every step is best-effort. Missing files are skipped, unreadable or unwritable files
//! are logged and skipped, and a file is only written when its contents changed.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RewriteSettings;

/// Why a rewrite step or file was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteSkip {
    EntryDocumentMissing { path: PathBuf },
    AssetsDirMissing { path: PathBuf },
    Unreadable { path: PathBuf, reason: String },
    Unwritable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub entry_document_modified: bool,
    pub scripts_modified: usize,
    pub skipped: Vec<RewriteSkip>,
}

impl RewriteReport {
    pub fn files_modified(&self) -> usize {
        usize::from(self.entry_document_modified) + self.scripts_modified
    }
}

pub struct AssetPathRewriter {
    settings: RewriteSettings,
    markup: Regex,
    /// `None` when no image extensions are configured.
    script: Option<Regex>,
}

impl AssetPathRewriter {
    pub fn new(settings: RewriteSettings) -> Result<Self, regex::Error> {
        // Attribute preceded by whitespace so `data-src` and friends stay out.
        // The value must start with exactly one `/`.
        let markup = Regex::new(r#"(\s(?i:href|src)=")/([^/"][^"]*)?""#)?;

        let script = if settings.image_extensions.is_empty() {
            None
        } else {
            let exts = settings
                .image_extensions
                .iter()
                .map(|e| regex::escape(e.trim_start_matches('.')))
                .collect::<Vec<_>>()
                .join("|");
            // No backreferences in `regex`, so each quote style gets its own branch.
            // Spaces may appear inside the path but not right after the leading slash,
            // and a literal never spans lines.
            let pattern = format!(
                r#""/([^"/\\\s][^"\\\r\n]*\.(?i:{exts}))"|'/([^'/\\\s][^'\\\r\n]*\.(?i:{exts}))'"#
            );
            Some(Regex::new(&pattern)?)
        };

        Ok(Self {
            settings,
            markup,
            script,
        })
    }

    pub fn settings(&self) -> &RewriteSettings {
        &self.settings
    }

    /// Rewrites `href="/X"` / `src="/X"` to `./X`.
    pub fn rewrite_markup<'t>(&self, input: &'t str) -> Cow<'t, str> {
        self.markup.replace_all(input, "${1}./${2}\"")
    }

    /// Rewrites `"/X.png"` / `'/X.png'` style literals to `./X.png`.
    pub fn rewrite_script<'t>(&self, input: &'t str) -> Cow<'t, str> {
        match &self.script {
            Some(re) => re.replace_all(input, |caps: &Captures| {
                if let Some(double) = caps.get(1) {
                    format!("\"./{}\"", double.as_str())
                } else if let Some(single) = caps.get(2) {
                    format!("'./{}'", single.as_str())
                } else {
                    caps[0].to_string()
                }
            }),
            None => Cow::Borrowed(input),
        }
    }

    /// Rewrites the entry document and every script under the assets directory in place.
    pub fn rewrite(&self, output_dir: &Path) -> RewriteReport {
        let mut report = RewriteReport::default();

        let entry = output_dir.join(&self.settings.entry_document);
        if entry.is_file() {
            report.entry_document_modified =
                rewrite_file(&entry, |text| self.rewrite_markup(text).into_owned(), &mut report.skipped);
        } else {
            info!(path = %entry.display(), "[REWRITE] Entry document absent, skipping");
            report
                .skipped
                .push(RewriteSkip::EntryDocumentMissing { path: entry });
        }

        let assets = output_dir.join(&self.settings.assets_dir);
        if assets.is_dir() {
            for script in self.script_files(&assets, &mut report.skipped) {
                if rewrite_file(&script, |text| self.rewrite_script(text).into_owned(), &mut report.skipped) {
                    report.scripts_modified += 1;
                }
            }
        } else {
            info!(path = %assets.display(), "[REWRITE] Assets directory absent, skipping");
            report
                .skipped
                .push(RewriteSkip::AssetsDirMissing { path: assets });
        }

        info!(
            entry_document_modified = report.entry_document_modified,
            scripts_modified = report.scripts_modified,
            skipped = report.skipped.len(),
            "[REWRITE] Asset path rewriting finished"
        );
        report
    }

    /// Script files anywhere under `root`, sorted.
    fn script_files(&self, root: &Path, skipped: &mut Vec<RewriteSkip>) -> Vec<PathBuf> {
        let mut scripts = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = ?e, path = %dir.display(), "[REWRITE] Could not list directory");
                    skipped.push(RewriteSkip::Unreadable {
                        path: dir,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                match entry.file_type() {
                    Ok(ft) if ft.is_dir() => pending.push(path),
                    Ok(ft) if ft.is_file() && self.is_script(&path) => scripts.push(path),
                    _ => {}
                }
            }
        }
        scripts.sort();
        scripts
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.settings
                    .script_extensions
                    .iter()
                    .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// Applies `transform` to the file at `path`. Returns whether the file was rewritten.
fn rewrite_file<F>(path: &Path, transform: F, skipped: &mut Vec<RewriteSkip>) -> bool
where
    F: Fn(&str) -> String,
{
    let original = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = ?e, path = %path.display(), "[REWRITE] Could not read file as text, skipping");
            skipped.push(RewriteSkip::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            return false;
        }
    };

    let rewritten = transform(&original);
    if rewritten == original {
        debug!(path = %path.display(), "[REWRITE] No root-relative references, leaving untouched");
        return false;
    }

    match fs::write(path, rewritten.as_bytes()) {
        Ok(()) => {
            info!(path = %path.display(), "[REWRITE] Rewrote root-relative references");
            true
        }
        Err(e) => {
            warn!(error = ?e, path = %path.display(), "[REWRITE] Could not write file, skipping");
            skipped.push(RewriteSkip::Unwritable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::tempdir;

    fn rewriter() -> AssetPathRewriter {
        AssetPathRewriter::new(RewriteSettings::default()).unwrap()
    }

    #[test]
    fn markup_root_relative_attributes_become_relative() {
        let html = r#"<link rel="icon" href="/favicon.ico"><script type="module" src="/assets/index-3f2a.js"></script>"#;
        let out = rewriter().rewrite_markup(html);
        assert_eq!(
            out,
            r#"<link rel="icon" href="./favicon.ico"><script type="module" src="./assets/index-3f2a.js"></script>"#
        );
    }

    #[test]
    fn markup_leaves_non_root_relative_values_untouched() {
        let cases = [
            r#"<a href="./x">"#,
            r#"<a href="http://x">"#,
            r#"<a href="https://cdn.example.com/x.js">"#,
            r#"<script src="//cdn.example.com/x.js"></script>"#,
            r#"<img src="img/a.png">"#,
            r#"<img data-src="/lazy.png">"#,
            r#"<!-- see /docs for details -->"#,
            r#"<a title="/not-an-attr-we-touch">"#,
            // attribute glued to the previous one, no separating whitespace
            r#"<img alt="x"src="/a.png">"#,
            // only double-quoted values are rewritten
            r#"<a href='/x'>"#,
        ];
        let r = rewriter();
        for html in cases {
            assert_eq!(r.rewrite_markup(html), html, "should not change: {html}");
        }
    }

    #[test]
    fn markup_bare_root_becomes_dot_slash() {
        assert_eq!(rewriter().rewrite_markup(r#"<a href="/">home</a>"#), r#"<a href="./">home</a>"#);
    }

    #[test]
    fn markup_rewrite_is_idempotent() {
        let r = rewriter();
        let once = r.rewrite_markup(r#"<a href="/a/b"><img src="/c.png">"#).into_owned();
        assert_eq!(once, r#"<a href="./a/b"><img src="./c.png">"#);
        assert_eq!(r.rewrite_markup(&once), once);
    }

    #[test]
    fn script_image_literals_become_relative() {
        let js = r#"const a="/logo.png",b='/icons/star.SVG';el.src="/hero.jpeg";"#;
        let out = rewriter().rewrite_script(js);
        assert_eq!(
            out,
            r#"const a="./logo.png",b='./icons/star.SVG';el.src="./hero.jpeg";"#
        );
    }

    #[test]
    fn script_image_literal_may_contain_spaces() {
        let r = rewriter();
        assert_eq!(r.rewrite_script(r#"x="/my logo.png""#), r#"x="./my logo.png""#);
        assert_eq!(r.rewrite_script(r#"x='/img/a b c.svg'"#), r#"x='./img/a b c.svg'"#);
    }

    #[test]
    fn script_leaves_other_literals_untouched() {
        let cases = [
            r#"fetch("/api/users")"#,
            r#"import("/assets/chunk.js")"#,
            r#"const u="//cdn.example.com/logo.png""#,
            r#"const u="https://example.com/logo.png""#,
            r#"const u="./logo.png""#,
            r#"const u="/logo.png.map""#,
            r#"// "/logo.png is referenced below"#,
            r#"const mixed="/logo.png';"#,
            r#"const lead="/ logo.png""#,
            "const split=\"/logo\n.png\"",
        ];
        let r = rewriter();
        for js in cases {
            assert_eq!(r.rewrite_script(js), js, "should not change: {js}");
        }
    }

    #[test]
    fn script_extension_set_is_configurable() {
        let settings = RewriteSettings {
            image_extensions: vec!["webp".to_string()],
            ..RewriteSettings::default()
        };
        let r = AssetPathRewriter::new(settings).unwrap();
        assert_eq!(r.rewrite_script(r#""/a.webp""#), r#""./a.webp""#);
        assert_eq!(r.rewrite_script(r#""/a.png""#), r#""/a.png""#);
    }

    #[test]
    fn empty_extension_set_disables_script_rewriting() {
        let settings = RewriteSettings {
            image_extensions: vec![],
            ..RewriteSettings::default()
        };
        let r = AssetPathRewriter::new(settings).unwrap();
        assert_eq!(r.rewrite_script(r#""/a.png""#), r#""/a.png""#);
    }

    #[test]
    fn rewrite_updates_files_in_place_and_counts_changes() {
        let tmp = tempdir().unwrap();
        let out = tmp.path();
        create_dir_all(out.join("assets/nested")).unwrap();
        write(out.join("index.html"), r#"<script src="/app.js"></script>"#).unwrap();
        write(out.join("assets/app.js"), r#"img.src="/logo.png";"#).unwrap();
        write(out.join("assets/nested/chunk.mjs"), r#"x='/a.gif'"#).unwrap();
        write(out.join("assets/clean.js"), r#"console.log("hi")"#).unwrap();
        write(out.join("assets/style.css"), r#"a{background:url("/bg.png")}"#).unwrap();

        let report = rewriter().rewrite(out);

        assert!(report.entry_document_modified);
        assert_eq!(report.scripts_modified, 2);
        assert_eq!(report.files_modified(), 3);
        assert!(report.skipped.is_empty());
        assert_eq!(
            read_to_string(out.join("index.html")).unwrap(),
            r#"<script src="./app.js"></script>"#
        );
        assert_eq!(read_to_string(out.join("assets/app.js")).unwrap(), r#"img.src="./logo.png";"#);
        assert_eq!(read_to_string(out.join("assets/nested/chunk.mjs")).unwrap(), r#"x='./a.gif'"#);
        // css is not a script
        assert_eq!(
            read_to_string(out.join("assets/style.css")).unwrap(),
            r#"a{background:url("/bg.png")}"#
        );

        let second = rewriter().rewrite(out);
        assert_eq!(second.files_modified(), 0);
    }

    #[test]
    fn missing_entry_and_assets_are_skipped() {
        let tmp = tempdir().unwrap();
        let report = rewriter().rewrite(tmp.path());
        assert_eq!(report.files_modified(), 0);
        assert_eq!(
            report.skipped,
            vec![
                RewriteSkip::EntryDocumentMissing {
                    path: tmp.path().join("index.html")
                },
                RewriteSkip::AssetsDirMissing {
                    path: tmp.path().join("assets")
                },
            ]
        );
    }

    #[test]
    fn non_utf8_script_is_skipped_not_fatal() {
        let tmp = tempdir().unwrap();
        create_dir_all(tmp.path().join("assets")).unwrap();
        write(tmp.path().join("index.html"), "<html></html>").unwrap();
        write(tmp.path().join("assets/bad.js"), [0xffu8, 0xfe, 0x00, 0x2f]).unwrap();
        write(tmp.path().join("assets/good.js"), r#""/x.ico""#).unwrap();

        let report = rewriter().rewrite(tmp.path());
        assert!(!report.entry_document_modified);
        assert_eq!(report.scripts_modified, 1);
        assert!(matches!(
            report.skipped.as_slice(),
            [RewriteSkip::Unreadable { path, .. }] if path.ends_with("bad.js")
        ));
    }
}
