use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                error!(pattern, error = %e, "Validation pattern failed to compile and is disabled");
                None
            }
        })
        .collect()
}

pub(crate) static SQL_INJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"(?i)'\s*(or|and)\s+['"\d]"#,
        r"(?i)\bunion\s+(all\s+)?select\b",
        r"(?i)\b(insert\s+into|delete\s+from|drop\s+(table|database)|truncate\s+table|alter\s+table)\b",
        r"(?i)\bexec(ute)?\s+(xp_|sp_)\w+",
        r"(?i);\s*(select|insert|update|delete|drop|shutdown)\b",
        r"--\s*$",
        r"/\*[\s\S]*?\*/",
    ])
});

pub(crate) static NOSQL_INJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\$(where|ne|eq|gt|gte|lt|lte|in|nin|regex|or|and|not|nor|exists|expr|function)\b",
        r"(?i)\bdb\.\w+\.(find|remove|drop|update)\s*\(",
        r"(?i)\bthis\.\w+\s*==",
    ])
});

pub(crate) static COMMAND_INJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"[;&|]\s*(rm|cat|ls|wget|curl|nc|bash|sh|chmod|chown|powershell|cmd)\b",
        r"\$\([^)]*\)",
        r"`[^`]*`",
        r"(?i)\b(/bin/(ba)?sh|cmd\.exe)\b",
    ])
});

pub(crate) static PATH_TRAVERSAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\.\./",
        r"\.\.\\",
        r"(?i)%2e%2e(%2f|%5c|/|\\)",
        r"(?i)(/etc/(passwd|shadow)|c:\\windows\\)",
    ])
});

pub(crate) static LDAP_INJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\*\)\s*\(",
        r"\)\s*\(\s*[|&!]",
        r"\(\s*[|&!]\s*\(",
    ])
});

pub(crate) static HTML_CONTENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)<\s*script\b",
        r"(?i)javascript\s*:",
        r"(?i)\bon(load|error|click|mouseover|focus|blur|submit|change)\s*=",
        r"(?i)</?(iframe|object|embed|img|svg|style|link|meta|html|body|form|input|a)[\s>/]",
    ])
});
