//! JavaScript and CSS printing.
//!
//! Uses oxc for JavaScript and lightningcss for CSS.

use anyhow::{Result, anyhow};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use parcel_sourcemap::SourceMap;
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

/// Minify JavaScript source code.
///
/// Returns `None` when the source does not parse.
pub fn minify_js(source: &str, source_type: SourceType) -> Option<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Some(code)
}

/// Parse a stylesheet and print it back, optionally minified.
///
/// `filename` only labels parse errors.
pub fn process_css(source: &str, filename: &str, minify: bool) -> Result<String> {
    print_css(source, filename, minify, None)
}

/// Like [`process_css`], also returning a source map (JSON) of the printed
/// text against `source`.
///
/// `filename` becomes the map's only `sources` entry, with `source`
/// embedded as its content.
pub fn process_css_with_map(source: &str, filename: &str, minify: bool) -> Result<(String, String)> {
    let mut map = SourceMap::new("/");
    let index = map.add_source(filename);
    map.set_source_content(index as usize, source)
        .map_err(|e| anyhow!("{e}"))?;

    let code = print_css(source, filename, minify, Some((index, &mut map)))?;
    let json = map.to_json(None).map_err(|e| anyhow!("{e}"))?;
    Ok((code, json))
}

fn print_css(
    source: &str,
    filename: &str,
    minify: bool,
    map: Option<(u32, &mut SourceMap)>,
) -> Result<String> {
    let (source_index, source_map) = match map {
        Some((index, map)) => (index, Some(map)),
        None => (0, None),
    };
    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: filename.to_owned(),
            source_index,
            ..ParserOptions::default()
        },
    )
    .map_err(|e| anyhow!("{e}"))?;

    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| anyhow!("{e}"))?;
    }

    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            source_map,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;
    Ok(result.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_js() {
        let code = minify_js("const answer = 40 + 2;\nconsole.log(answer);\n", SourceType::mjs())
            .unwrap();
        assert!(code.contains("console.log"));
        assert!(code.len() < 40);
    }

    #[test]
    fn test_minify_js_rejects_syntax_error() {
        assert!(minify_js("const = ;", SourceType::mjs()).is_none());
    }

    #[test]
    fn test_process_css_minify() {
        let css = process_css(".a {\n  color: red;\n}\n", "a.css", true).unwrap();
        assert_eq!(css, ".a{color:red}");
    }

    #[test]
    fn test_process_css_with_map_embeds_source() {
        let source = ".a {\n  color: red;\n}\n";
        let (css, map) = process_css_with_map(source, "theme.css", true).unwrap();
        assert_eq!(css, ".a{color:red}");
        assert!(map.contains(r#""sources":["theme.css"]"#));
        assert!(map.contains("color: red"));
        assert!(!map.contains(r#""mappings":"""#));
    }

    #[test]
    fn test_process_css_normalize_keeps_rules() {
        let css = process_css(".a{color:red}", "a.css", false).unwrap();
        assert!(css.contains(".a {"));
        assert!(css.contains("color: red"));
    }
}
