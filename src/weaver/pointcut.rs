// パス: src/weaver/pointcut.rs
// 役割: ポイントカットのグロブパターンと関数名の照合
// 意図: 副作用のない純粋関数として切り出し、単体で検証できるようにする

/// `pattern` が関数名 `name` 全体に一致するか。
///
/// - 末尾が `*` なら、その手前までの接頭辞比較。
/// - 次に完全一致。
/// - それでも決まらなければ `*` を任意長として後戻り付きで照合する。
///
/// 大文字小文字を区別し、両端を固定する。`?` に特別な意味はない。
///
/// # Examples
/// ```
/// use lyn::weaver::pointcut::matches;
/// assert!(matches("test_*", "test_foo"));
/// assert!(matches("*_test", "foo_test"));
/// assert!(!matches("test_*", "footest_"));
/// ```
pub fn matches(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') {
            return name.starts_with(prefix);
        }
    }
    if pattern == name {
        return true;
    }
    glob(pattern.as_bytes(), name.as_bytes())
}

fn glob(p: &[u8], s: &[u8]) -> bool {
    match p.split_first() {
        None => s.is_empty(),
        Some((b'*', rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=s.len()).any(|i| glob(rest, &s[i..]))
        }
        Some((c, rest)) => s.first() == Some(c) && glob(rest, &s[1..]),
    }
}
