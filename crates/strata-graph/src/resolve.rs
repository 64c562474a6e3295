use std::collections::BTreeSet;

use strata_core::{FileRecord, UnitId};

const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];
const JS_INDEX_CANDIDATES: &[&str] = &[
    "index.ts", "index.tsx", "index.js", "index.jsx", "index.mjs", "index.cjs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitLanguage {
    JsTs,
    Python,
    Rust,
    Other,
}

fn language_of(path: &str) -> UnitLanguage {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs") => UnitLanguage::JsTs,
        Some("py") => UnitLanguage::Python,
        Some("rs") => UnitLanguage::Rust,
        _ => UnitLanguage::Other,
    }
}

pub fn extract_references(record: &FileRecord) -> Vec<String> {
    let Some(content) = &record.content else {
        return Vec::new();
    };
    match language_of(&record.path) {
        UnitLanguage::JsTs => scan_js(content),
        UnitLanguage::Python => scan_python(content),
        UnitLanguage::Rust => scan_rust(content),
        UnitLanguage::Other => Vec::new(),
    }
}

pub fn resolve_reference(from: &str, spec: &str, paths: &BTreeSet<UnitId>) -> Option<UnitId> {
    match language_of(from) {
        UnitLanguage::JsTs => resolve_js(from, spec, paths),
        UnitLanguage::Python => resolve_python(from, spec, paths),
        UnitLanguage::Rust => resolve_rust(from, spec, paths),
        UnitLanguage::Other => None,
    }
}

fn scan_js(content: &str) -> Vec<String> {
    let mut specs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("import ") || line.starts_with("export ") {
            if let Some(position) = line.find(" from ") {
                if let Some(spec) = quoted_at(&line[position + " from ".len()..]) {
                    specs.push(spec);
                    continue;
                }
            }
            if let Some(rest) = line.strip_prefix("import ")
                && let Some(spec) = quoted_at(rest)
            {
                specs.push(spec);
                continue;
            }
        }
        for marker in ["require(", "import("] {
            if let Some(position) = line.find(marker)
                && let Some(spec) = quoted_at(&line[position + marker.len()..])
            {
                specs.push(spec);
            }
        }
    }
    specs
}

fn scan_python(content: &str) -> Vec<String> {
    let mut specs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("from ") {
            if let Some(module) = rest.split_whitespace().next()
                && rest.contains("import")
            {
                specs.push(module.to_owned());
            }
        } else if let Some(rest) = line.strip_prefix("import ") {
            for part in rest.split(',') {
                let module = part.split_whitespace().next().unwrap_or_default();
                if !module.is_empty() {
                    specs.push(module.to_owned());
                }
            }
        }
    }
    specs
}

fn scan_rust(content: &str) -> Vec<String> {
    let mut specs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        let declaration = line
            .strip_prefix("pub mod ")
            .or_else(|| line.strip_prefix("mod "));
        if let Some(rest) = declaration
            && let Some(name) = rest.strip_suffix(';')
        {
            let name = name.trim();
            if !name.is_empty() && name.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                specs.push(name.to_owned());
            }
        }
    }
    specs
}

fn quoted_at(text: &str) -> Option<String> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &text[1..];
    let end = rest.find(quote)?;
    let spec = &rest[..end];
    (!spec.is_empty()).then(|| spec.to_owned())
}

fn resolve_js(from: &str, spec: &str, paths: &BTreeSet<UnitId>) -> Option<UnitId> {
    if !spec.starts_with("./") && !spec.starts_with("../") {
        return None;
    }
    let base = join_relative(parent_dir(from), spec)?;
    if paths.contains(&base) {
        return Some(base);
    }
    for extension in JS_EXTENSIONS {
        let candidate = format!("{base}.{extension}");
        if paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    for index in JS_INDEX_CANDIDATES {
        let candidate = format!("{base}/{index}");
        if paths.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn resolve_python(from: &str, spec: &str, paths: &BTreeSet<UnitId>) -> Option<UnitId> {
    let dots = spec.chars().take_while(|ch| *ch == '.').count();
    let remainder = &spec[dots..];
    let module_path = remainder.replace('.', "/");

    let base = if dots == 0 {
        module_path
    } else {
        let mut dir = parent_dir(from).to_owned();
        for _ in 1..dots {
            match dir.rsplit_once('/') {
                Some((parent, _)) => dir = parent.to_owned(),
                None if dir.is_empty() => return None,
                None => dir = String::new(),
            }
        }
        if module_path.is_empty() {
            dir
        } else if dir.is_empty() {
            module_path
        } else {
            format!("{dir}/{module_path}")
        }
    };
    if base.is_empty() {
        return None;
    }

    let file_candidate = format!("{base}.py");
    if paths.contains(&file_candidate) {
        return Some(file_candidate);
    }
    let package_candidate = format!("{base}/__init__.py");
    if paths.contains(&package_candidate) {
        return Some(package_candidate);
    }
    None
}

fn resolve_rust(from: &str, spec: &str, paths: &BTreeSet<UnitId>) -> Option<UnitId> {
    let dir = parent_dir(from);
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };
    let file_candidate = format!("{prefix}{spec}.rs");
    if paths.contains(&file_candidate) {
        return Some(file_candidate);
    }
    let module_candidate = format!("{prefix}{spec}/mod.rs");
    if paths.contains(&module_candidate) {
        return Some(module_candidate);
    }
    None
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join_relative(dir: &str, spec: &str) -> Option<String> {
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::content_hash;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_owned(),
            content: Some(content.to_owned()),
            content_hash: content_hash(content),
            is_binary: false,
        }
    }

    fn path_set(paths: &[&str]) -> BTreeSet<UnitId> {
        paths.iter().map(|path| (*path).to_owned()).collect()
    }

    #[test]
    fn js_import_forms_are_extracted_in_line_order() {
        let specs = extract_references(&record(
            "src/a.ts",
            concat!(
                "import def from \"./one\";\n",
                "import \"./two\";\n",
                "export { x } from \"./three\";\n",
                "const lazy = import(\"./four\");\n",
                "const legacy = require('./five');\n",
            ),
        ));
        assert_eq!(specs, vec!["./one", "./two", "./three", "./four", "./five"]);
    }

    #[test]
    fn python_import_forms_are_extracted() {
        let specs = extract_references(&record(
            "pkg/app.py",
            "import os, pkg.util as u\nfrom .sibling import helper\nfrom pkg.deep.mod import x\n",
        ));
        assert_eq!(specs, vec!["os", "pkg.util", ".sibling", "pkg.deep.mod"]);
    }

    #[test]
    fn rust_mod_declarations_are_extracted() {
        let specs = extract_references(&record(
            "src/lib.rs",
            "mod alpha;\npub mod beta;\nmod gamma { }\n",
        ));
        assert_eq!(specs, vec!["alpha", "beta"]);
    }

    #[test]
    fn js_relative_specifier_resolves_with_extension_candidates() {
        let paths = path_set(&["src/a.ts", "src/b.ts", "src/dir/index.js"]);
        assert_eq!(
            resolve_reference("src/a.ts", "./b", &paths),
            Some("src/b.ts".to_owned())
        );
        assert_eq!(
            resolve_reference("src/a.ts", "./dir", &paths),
            Some("src/dir/index.js".to_owned())
        );
        assert_eq!(resolve_reference("src/a.ts", "react", &paths), None);
        assert_eq!(resolve_reference("src/a.ts", "../../escape", &paths), None);
    }

    #[test]
    fn python_absolute_and_relative_imports_resolve() {
        let paths = path_set(&["pkg/__init__.py", "pkg/util.py", "pkg/app.py"]);
        assert_eq!(
            resolve_reference("pkg/app.py", "pkg.util", &paths),
            Some("pkg/util.py".to_owned())
        );
        assert_eq!(
            resolve_reference("pkg/app.py", ".util", &paths),
            Some("pkg/util.py".to_owned())
        );
        assert_eq!(
            resolve_reference("pkg/app.py", ".", &paths),
            Some("pkg/__init__.py".to_owned())
        );
        assert_eq!(resolve_reference("pkg/app.py", "os", &paths), None);
    }

    #[test]
    fn rust_mod_resolves_to_sibling_or_module_directory() {
        let paths = path_set(&["src/lib.rs", "src/alpha.rs", "src/beta/mod.rs"]);
        assert_eq!(
            resolve_reference("src/lib.rs", "alpha", &paths),
            Some("src/alpha.rs".to_owned())
        );
        assert_eq!(
            resolve_reference("src/lib.rs", "beta", &paths),
            Some("src/beta/mod.rs".to_owned())
        );
        assert_eq!(resolve_reference("src/lib.rs", "missing", &paths), None);
    }
}
