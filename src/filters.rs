use heck::ToUpperCamelCase;

pub use self::module_path as filter_module_path;
pub use self::pascalcase as filter_pascalcase;
pub use self::slash_path as filter_slash_path;

/// Type-name casing for a template base name: `foo-bar` becomes `FooBar`.
pub fn pascalcase(s: String) -> String {
    s.to_upper_camel_case()
}

pub fn slash_path(s: String) -> String {
    s.replace('\\', "/")
}

/// Import specifier for a TypeScript module: slashes normalized and the
/// `.ts` extension dropped.
pub fn module_path(s: String) -> String {
    let s = slash_path(s);
    match s.strip_suffix(".ts") {
        Some(stripped) => stripped.to_string(),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascalcase() {
        assert_eq!(pascalcase("welcome".into()), "Welcome");
        assert_eq!(pascalcase("foo-bar".into()), "FooBar");
        assert_eq!(pascalcase("test1".into()), "Test1");
        assert_eq!(pascalcase("order-shipped-v2".into()), "OrderShippedV2");
    }

    #[test]
    fn test_module_path() {
        assert_eq!(module_path(r"C:\app\emails\a.data.ts".into()), "C:/app/emails/a.data");
        assert_eq!(module_path("/a/b.vue".into()), "/a/b.vue");
    }
}
