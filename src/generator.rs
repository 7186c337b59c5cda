use serde::Serialize;
use std::path::Path;

use crate::engine::TemplateEngine;
use crate::error::BuildError;
use crate::paths::{to_slash, TemplatePaths};

/// Preview page composing the layout with one template.
const WRAPPER_TEMPLATE: &str = r#"<script setup lang="ts">
import EmailsLayout from '{{ layout | slash_path }}'
import EmailComponent from '{{ component | slash_path }}'{% if data_store %}
import * as emailStore from '{{ data_store | slash_path }}'{% endif %}

definePageMeta({
  layout: false,
})
</script>

<template>
  <EmailsLayout{% if data_store %} :email-store="emailStore"{% endif %}>
    <EmailComponent />
  </EmailsLayout>
</template>
"#;

/// Server route rendering one template through its preview page.
const API_HANDLER_TEMPLATE: &str = r#"import { defineEventHandler, readBody, createError } from 'h3'
import { encodeStoreToUrlParams, useRuntimeConfig } from '#imports'
{% if data_store %}import type { {{ name | pascalcase }}Data } from '{{ data_store | module_path }}'
{% endif %}
export default defineEventHandler(async (event) => {
  const body = await readBody<{% if data_store %}{{ name | pascalcase }}Data{% else %}Record<string, unknown>{% endif %}>(event)

  const params = encodeStoreToUrlParams(body)
  const separator = params ? '&' : '?'
  const emailUrl = `{{ route_path }}${params}${separator}server=true`

  const baseUrl = process.env.NUXT_PUBLIC_SITE_URL || '{{ site_url }}'
  const fullUrl = `${baseUrl}${emailUrl}`

  try {
    const response = await fetch(fullUrl)
    if (!response.ok) {
      throw new Error(`Failed to render email: ${response.status} ${response.statusText}`)
    }
    const html = await response.text()

    const config = useRuntimeConfig()
    const sendHandler = config.nuxtGenEmails?.sendGeneratedHtml

    if (sendHandler) {
      await sendHandler({
        html,
        data: body,
        templatePath: '{{ component | slash_path }}',
      })
    }

    return {
      success: true,
      message: 'Email rendered successfully',
      html,
    }
  }
  catch (error: unknown) {
    const message = error instanceof Error && error.message ? error.message : 'Failed to render or send email'
    throw createError({
      statusCode: 500,
      statusMessage: message,
    })
  }
})
"#;

/// Inputs shared by both artifact skeletons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactParams {
    pub id: String,
    pub name: String,
    pub layout: String,
    pub component: String,
    /// Only set when the data-store file exists.
    pub data_store: Option<String>,
    pub route_path: String,
    pub site_url: String,
}

impl ArtifactParams {
    pub fn new(paths: &TemplatePaths, layout: &Path, site_url: &str, has_data_store: bool) -> Self {
        Self {
            id: paths.id.clone(),
            name: paths.name.clone(),
            layout: to_slash(layout),
            component: to_slash(&paths.template),
            data_store: has_data_store.then(|| to_slash(&paths.data_store)),
            route_path: paths.route.path.clone(),
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub wrapper: String,
    pub api_handler: String,
}

#[derive(Default)]
pub struct ArtifactGenerator {
    engine: TemplateEngine,
}

impl ArtifactGenerator {
    pub fn new(engine: TemplateEngine) -> Self {
        Self { engine }
    }

    pub fn wrapper(&self, params: &ArtifactParams) -> Result<String, BuildError> {
        self.engine
            .render_string(WRAPPER_TEMPLATE, params)
            .map_err(|e| BuildError::Render(format!("wrapper for {}: {}", params.id, e)))
    }

    pub fn api_handler(&self, params: &ArtifactParams) -> Result<String, BuildError> {
        self.engine
            .render_string(API_HANDLER_TEMPLATE, params)
            .map_err(|e| BuildError::Render(format!("API handler for {}: {}", params.id, e)))
    }

    pub fn generate(&self, params: &ArtifactParams) -> Result<Artifacts, BuildError> {
        Ok(Artifacts {
            wrapper: self.wrapper(params)?,
            api_handler: self.api_handler(params)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathMapper;
    use pretty_assertions::assert_eq;

    fn params(id: &str, has_store: bool) -> ArtifactParams {
        let mapper = PathMapper::new("/app/emails", "/app/.nuxt/email-wrappers", "/app/server/api/emails");
        let paths = mapper.map(&mapper.template_path(id)).unwrap();
        ArtifactParams::new(
            &paths,
            Path::new("/mod/runtime/pages/__emails.vue"),
            "http://localhost:3000",
            has_store,
        )
    }

    #[test]
    fn test_wrapper_with_store() {
        let generator = ArtifactGenerator::default();
        let out = generator.wrapper(&params("account/invite", true)).unwrap();
        assert_eq!(
            out,
            r#"<script setup lang="ts">
import EmailsLayout from '/mod/runtime/pages/__emails.vue'
import EmailComponent from '/app/emails/account/invite.vue'
import * as emailStore from '/app/emails/account/invite.data.ts'

definePageMeta({
  layout: false,
})
</script>

<template>
  <EmailsLayout :email-store="emailStore">
    <EmailComponent />
  </EmailsLayout>
</template>
"#
        );
    }

    #[test]
    fn test_wrapper_without_store() {
        let generator = ArtifactGenerator::default();
        let out = generator.wrapper(&params("welcome", false)).unwrap();
        assert_eq!(
            out,
            r#"<script setup lang="ts">
import EmailsLayout from '/mod/runtime/pages/__emails.vue'
import EmailComponent from '/app/emails/welcome.vue'

definePageMeta({
  layout: false,
})
</script>

<template>
  <EmailsLayout>
    <EmailComponent />
  </EmailsLayout>
</template>
"#
        );
        assert!(!out.contains("data.ts"));
        assert!(!out.contains("emailStore"));
    }

    #[test]
    fn test_api_handler_with_store() {
        let generator = ArtifactGenerator::default();
        let out = generator.api_handler(&params("v1/order-shipped", true)).unwrap();
        assert!(out.starts_with(
            "import { defineEventHandler, readBody, createError } from 'h3'\n\
             import { encodeStoreToUrlParams, useRuntimeConfig } from '#imports'\n\
             import type { OrderShippedData } from '/app/emails/v1/order-shipped.data'\n\
             \n\
             export default defineEventHandler(async (event) => {\n  \
             const body = await readBody<OrderShippedData>(event)\n"
        ));
        assert!(out.contains(
            "const emailUrl = `/__emails/v1/order-shipped${params}${separator}server=true`"
        ));
        assert!(out.contains(
            "const baseUrl = process.env.NUXT_PUBLIC_SITE_URL || 'http://localhost:3000'"
        ));
        assert!(out.contains("templatePath: '/app/emails/v1/order-shipped.vue',"));
        assert!(out.contains("'Failed to render or send email'"));
        assert!(out.ends_with("})\n"));
    }

    #[test]
    fn test_api_handler_without_store() {
        let generator = ArtifactGenerator::default();
        let out = generator.api_handler(&params("welcome", false)).unwrap();
        assert!(out.starts_with(
            "import { defineEventHandler, readBody, createError } from 'h3'\n\
             import { encodeStoreToUrlParams, useRuntimeConfig } from '#imports'\n\
             \n\
             export default defineEventHandler(async (event) => {\n  \
             const body = await readBody<Record<string, unknown>>(event)\n"
        ));
        assert!(!out.contains("import type"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let generator = ArtifactGenerator::default();
        let p = params("billing/invoice", true);
        let first = generator.generate(&p).unwrap();
        let second = ArtifactGenerator::default().generate(&p).unwrap();
        assert_eq!(first, second);
    }
}
