//! Whole-line comment detection, driven by a per-extension syntax table.

use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: &'static [(&'static str, &'static str)],
}

const C_LIKE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: &[("/*", "*/")],
};
const HASH: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: &[],
};
const RUBY: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: &[("=begin", "=end")],
};
const PHP: CommentSyntax = CommentSyntax {
    line: &["//", "#"],
    block: &[("/*", "*/")],
};
const SQL: CommentSyntax = CommentSyntax {
    line: &["--"],
    block: &[("/*", "*/")],
};
const LUA: CommentSyntax = CommentSyntax {
    line: &["--"],
    block: &[("--[[", "]]")],
};
const HASKELL: CommentSyntax = CommentSyntax {
    line: &["--"],
    block: &[("{-", "-}")],
};
const ML: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("(*", "*)")],
};
const MARKUP: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("<!--", "-->")],
};
const CSS: CommentSyntax = CommentSyntax {
    line: &[],
    block: &[("/*", "*/")],
};
const PERCENT: CommentSyntax = CommentSyntax {
    line: &["%"],
    block: &[],
};
const ADA: CommentSyntax = CommentSyntax {
    line: &["--"],
    block: &[],
};
const LISP: CommentSyntax = CommentSyntax {
    line: &[";"],
    block: &[],
};
const VB: CommentSyntax = CommentSyntax {
    line: &["'"],
    block: &[],
};

/// Extension to syntax. Lookups are case-insensitive.
const REGISTRY: &[(&[&str], CommentSyntax)] = &[
    (
        &[
            "c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx", "java", "js", "jsx", "mjs", "ts",
            "tsx", "glsl", "cs", "go", "rs", "swift", "kt", "kts", "scala", "dart", "groovy",
            "m", "mm",
        ],
        C_LIKE,
    ),
    (
        &[
            "py", "pyi", "sh", "bash", "zsh", "pl", "pm", "r", "cif", "yaml", "yml", "toml",
            "cmake", "mk", "tcl", "jl", "ex", "exs", "nim",
        ],
        HASH,
    ),
    (&["rb", "rake"], RUBY),
    (&["php"], PHP),
    (&["sql"], SQL),
    (&["lua"], LUA),
    (&["hs", "lhs", "elm"], HASKELL),
    (&["ml", "mli", "fs", "fsi", "pas"], ML),
    (&["html", "htm", "xml", "xhtml", "svg", "vue"], MARKUP),
    (&["css", "scss", "less"], CSS),
    (&["tex", "sty", "erl", "hrl", "matlab"], PERCENT),
    (&["adb", "ads", "vhd", "vhdl"], ADA),
    (&["lisp", "cl", "el", "clj", "scm", "asm", "s"], LISP),
    (&["vb", "bas", "vbs"], VB),
];

/// Comment syntax for the extension of `path`, if known.
pub fn syntax_for(path: &str) -> Option<&'static CommentSyntax> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    REGISTRY
        .iter()
        .find(|(exts, _)| exts.contains(&ext.as_str()))
        .map(|(_, syntax)| syntax)
}

/// Flag every line that holds nothing but a comment. Lines inside a block
/// comment count; a line with code before or after a comment does not.
pub fn comment_lines<S: AsRef<str>>(path: &str, lines: &[S]) -> Vec<bool> {
    let Some(syntax) = syntax_for(path) else {
        return vec![false; lines.len()];
    };

    let mut flags = Vec::with_capacity(lines.len());
    let mut open_block: Option<&str> = None;

    for line in lines {
        let trimmed = line.as_ref().trim();

        if let Some(end) = open_block {
            if trimmed.contains(end) {
                open_block = None;
            }
            flags.push(true);
            continue;
        }

        if trimmed.is_empty() {
            flags.push(false);
            continue;
        }

        if let Some((start, end)) = syntax.block.iter().find(|(start, _)| trimmed.starts_with(start)) {
            let rest = &trimmed[start.len()..];
            match rest.find(end) {
                None => {
                    open_block = Some(*end);
                    flags.push(true);
                }
                Some(pos) => flags.push(rest[pos + end.len()..].trim().is_empty()),
            }
            continue;
        }

        flags.push(syntax.line.iter().any(|token| trimmed.starts_with(token)));
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_hash_comments() {
        let lines = ["# header", "x = 1  # trailing", "    # indented", "", "y = 2"];
        assert_eq!(
            comment_lines("a.py", &lines),
            vec![true, false, true, false, false]
        );
    }

    #[test]
    fn c_block_comments_span_lines() {
        let lines = [
            "/* start",
            " * middle",
            " */",
            "int x; // trailing",
            "/* one liner */",
            "/* lead */ int y;",
            "// whole",
        ];
        assert_eq!(
            comment_lines("main.C", &lines),
            vec![true, true, true, false, true, false, true]
        );
    }

    #[test]
    fn lua_block_wins_over_line_token() {
        let lines = ["--[[", "inside", "]]", "print(1)", "-- note"];
        assert_eq!(
            comment_lines("init.lua", &lines),
            vec![true, true, true, false, true]
        );
    }

    #[test]
    fn unknown_extension_has_no_comments() {
        assert!(syntax_for("README").is_none());
        assert_eq!(comment_lines("notes.txt", &["# not a comment"]), vec![false]);
    }
}
