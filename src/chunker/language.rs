//! Language detection and grammar tables

use tree_sitter::Language;

/// Map a file extension (without dot, lowercase) to a language tag.
///
/// Recognised-but-grammarless languages (Kotlin, Scala, Objective-C) keep
/// their tag; the chunker routes them to the size-based strategy.
pub fn detect_language(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" | "sc" => "scala",
        "m" | "mm" => "objective-c",
        "md" | "markdown" => "markdown",
        _ => "text",
    }
}

/// Grammar for a language tag, when one is linked in
pub fn grammar(language: &str) -> Option<Language> {
    match language {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "csharp" => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        "ruby" => Some(tree_sitter_ruby::LANGUAGE.into()),
        "php" => Some(tree_sitter_php::LANGUAGE_PHP.into()),
        "swift" => Some(tree_sitter_swift::LANGUAGE.into()),
        _ => None,
    }
}

/// Node kinds that open a chunk boundary for each language
pub fn splittable_kinds(language: &str) -> &'static [&'static str] {
    match language {
        "rust" => &[
            "function_item",
            "impl_item",
            "trait_item",
            "struct_item",
            "enum_item",
            "mod_item",
            "macro_definition",
        ],
        "python" => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        "javascript" => &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "method_definition",
            "class_declaration",
            "export_statement",
        ],
        "typescript" => &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "method_definition",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "type_alias_declaration",
            "export_statement",
        ],
        "go" => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
        ],
        "java" => &[
            "method_declaration",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "constructor_declaration",
        ],
        "c" => &[
            "function_definition",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
            "type_definition",
        ],
        "cpp" => &[
            "function_definition",
            "class_specifier",
            "struct_specifier",
            "enum_specifier",
            "union_specifier",
            "namespace_definition",
            "template_declaration",
        ],
        "csharp" => &[
            "method_declaration",
            "class_declaration",
            "struct_declaration",
            "interface_declaration",
            "enum_declaration",
            "namespace_declaration",
            "constructor_declaration",
            "property_declaration",
        ],
        "ruby" => &[
            "method",
            "singleton_method",
            "class",
            "singleton_class",
            "module",
        ],
        "php" => &[
            "function_definition",
            "method_declaration",
            "class_declaration",
            "interface_declaration",
            "trait_declaration",
            "namespace_definition",
        ],
        "swift" => &[
            "function_declaration",
            "class_declaration",
            "protocol_declaration",
            "init_declaration",
            "deinit_declaration",
            "subscript_declaration",
        ],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("rs"), "rust");
        assert_eq!(detect_language(".ts"), "typescript");
        assert_eq!(detect_language("TSX"), "typescript");
        assert_eq!(detect_language("kt"), "kotlin");
        assert_eq!(detect_language("md"), "markdown");
        assert_eq!(detect_language("zig"), "text");
    }

    #[test]
    fn test_grammar_availability() {
        assert!(grammar("rust").is_some());
        assert!(grammar("python").is_some());
        assert!(grammar("typescript").is_some());
        // Recognised languages without a linked grammar
        assert!(grammar("kotlin").is_none());
        assert!(grammar("scala").is_none());
        assert!(grammar("markdown").is_none());
    }

    #[test]
    fn test_splittable_kinds_nonempty_for_grammars() {
        for lang in [
            "rust",
            "python",
            "javascript",
            "typescript",
            "go",
            "java",
            "c",
            "cpp",
            "csharp",
            "ruby",
            "php",
            "swift",
        ] {
            assert!(
                !splittable_kinds(lang).is_empty(),
                "no splittable kinds for {lang}"
            );
        }
        assert!(splittable_kinds("kotlin").is_empty());
    }
}
