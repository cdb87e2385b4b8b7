//! Stylesheet compilation.
//!
//! `.css` entries go through the lightningcss bundler so `@import` chains are
//! inlined; `.scss` entries are compiled by grass first. Both end up parsed,
//! minified and printed by lightningcss.

use std::path::Path;

use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

use crate::BundleError;

/// Source language of a style module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleLang {
    Css,
    Scss,
}

impl StyleLang {
    /// Language for a file path, or `None` for non-style files.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "css" => Some(StyleLang::Css),
            "scss" => Some(StyleLang::Scss),
            _ => None,
        }
    }
}

fn css_error(name: &str, message: impl ToString) -> BundleError {
    BundleError::CssError {
        path: name.to_string(),
        message: message.to_string(),
    }
}

/// Compile a stylesheet from disk, following its imports.
pub fn compile_file(path: &Path, lang: StyleLang, minify: bool) -> Result<String, BundleError> {
    let name = path.display().to_string();
    match lang {
        StyleLang::Css => {
            let fs = FileProvider::new();
            let mut bundler = Bundler::new(&fs, None, ParserOptions::default());
            let mut sheet = bundler.bundle(path).map_err(|e| css_error(&name, e))?;
            print(&name, &mut sheet, minify)
        }
        StyleLang::Scss => {
            let css = grass::from_path(path, &grass::Options::default())
                .map_err(|e| css_error(&name, e))?;
            compile_css(&name, &css, minify)
        }
    }
}

/// Compile stylesheet text that did not come straight from disk.
pub fn compile_source(
    name: &str,
    source: &str,
    lang: StyleLang,
    minify: bool,
) -> Result<String, BundleError> {
    match lang {
        StyleLang::Css => compile_css(name, source, minify),
        StyleLang::Scss => {
            let css = grass::from_string(source.to_string(), &grass::Options::default())
                .map_err(|e| css_error(name, e))?;
            compile_css(name, &css, minify)
        }
    }
}

/// Parse plain CSS and print it, minified if requested.
pub fn compile_css(name: &str, css: &str, minify: bool) -> Result<String, BundleError> {
    let options = ParserOptions {
        filename: name.to_string(),
        ..ParserOptions::default()
    };
    let mut sheet = StyleSheet::parse(css, options).map_err(|e| css_error(name, e))?;
    print(name, &mut sheet, minify)
}

fn print(name: &str, sheet: &mut StyleSheet<'_>, minify: bool) -> Result<String, BundleError> {
    if minify {
        sheet
            .minify(MinifyOptions::default())
            .map_err(|e| css_error(name, e))?;
    }
    let result = sheet
        .to_css(PrinterOptions {
            minify,
            ..PrinterOptions::default()
        })
        .map_err(|e| css_error(name, e))?;
    Ok(result.code.trim().to_string())
}
