//! The human-facing documentation page.
//!
//! This is a static ReDoc shell that renders against the machine-readable
//! schema document served at `/openapi.json`; there is no server-side
//! rendering involved.

pub(crate) fn docs_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>{} - Documentation</title>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <style>
      body {{
        margin: 0;
        padding: 0;
      }}
    </style>
  </head>
  <body>
    <redoc spec-url="/openapi.json"></redoc>
    <script src="https://cdn.jsdelivr.net/npm/redoc@2/bundles/redoc.standalone.js"></script>
  </body>
</html>
"#,
        title
    )
}

#[cfg(test)]
mod test {
    use super::docs_page;

    #[test]
    fn test_docs_page_references_schema_document() {
        let page = docs_page("My API");
        assert!(page.contains("<title>My API - Documentation</title>"));
        assert!(page.contains("spec-url=\"/openapi.json\""));
    }
}
