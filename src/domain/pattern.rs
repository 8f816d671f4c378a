use regex::{Regex, RegexBuilder};

/// 单个文件名过滤条件
#[derive(Debug, Clone)]
enum NameFilter {
    /// 不含通配符，忽略大小写的完整匹配 (已转为小写)
    Literal(String),
    /// 含 `*` 或 `?` 的通配符模式
    Glob(Regex),
}

impl NameFilter {
    fn parse(token: &str) -> Self {
        if !token.contains(['*', '?']) {
            return NameFilter::Literal(token.to_lowercase());
        }

        let pattern = glob_to_regex(token);
        match RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
        {
            Ok(regex) => NameFilter::Glob(regex),
            // 只有超出正则编译大小上限时才会走到这里
            Err(_) => NameFilter::Literal(token.to_lowercase()),
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            NameFilter::Literal(literal) => file_name.to_lowercase() == *literal,
            NameFilter::Glob(regex) => regex.is_match(file_name),
        }
    }
}

/// 预编译的文件名过滤集合，任意一个条件匹配即视为匹配
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<NameFilter>,
}

impl FilterSet {
    /// 从过滤条件列表创建，空白条目会被忽略
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filters = tokens
            .into_iter()
            .filter_map(|token| {
                let token = token.as_ref().trim();
                (!token.is_empty()).then(|| NameFilter::parse(token))
            })
            .collect();

        Self { filters }
    }

    /// 没有有效过滤条件时匹配所有文件
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// 检查文件名是否匹配
    pub fn matches(&self, file_name: &str) -> bool {
        self.is_empty() || self.filters.iter().any(|filter| filter.matches(file_name))
    }
}

/// 检查文件名是否匹配任意一个过滤条件
pub fn matches<S: AsRef<str>>(file_name: &str, filters: &[S]) -> bool {
    FilterSet::new(filters).matches(file_name)
}

/// 将通配符模式转换为锚定的正则表达式
///
/// `*` 匹配任意长度字符，`?` 匹配单个字符，其余字符全部转义。
pub fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');

    let mut literal = String::new();
    for ch in glob.chars() {
        match ch {
            '*' | '?' => {
                pattern.push_str(&regex::escape(&literal));
                literal.clear();
                pattern.push_str(if ch == '*' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    pattern.push_str(&regex::escape(&literal));

    pattern.push('$');
    pattern
}

/// 解析分号分隔的过滤条件列表，例如 `"*.txt;*.log"`
pub fn parse_filter_list(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
