//! Public sitemap URL shapes and their resolution to query variables.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use sitemapper_core::SitemapSettings;

static STYLESHEET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z0-9_-]+)-stylesheet\.xsl$").unwrap());

static LISTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z0-9_-]+)-sitemap-([0-9]+)\.xml$").unwrap());

/// Query variables a public sitemap URL resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum SitemapRoute {
    Index,
    Stylesheet {
        object_type: String,
    },
    Listing {
        bucket: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        page: u32,
    },
}

/// Resolve a request path. Rules are tried most specific first; a
/// namespaced listing is matched before the generic one.
pub fn resolve(path: &str, settings: &SitemapSettings) -> Option<SitemapRoute> {
    if path.trim_start_matches('/') == settings.sitemap_slug {
        return Some(SitemapRoute::Index);
    }

    if let Some(caps) = STYLESHEET_RE.captures(path) {
        return Some(SitemapRoute::Stylesheet {
            object_type: caps[1].to_string(),
        });
    }

    let caps = LISTING_RE.captures(path)?;
    let page: u32 = caps[2].parse().ok().filter(|p| *p >= 1)?;
    let name = &caps[1];

    for prefix in [&settings.cpt_prefix, &settings.taxonomy_prefix] {
        if let Some(bucket) = name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
        {
            return Some(SitemapRoute::Listing {
                bucket: bucket.to_string(),
                prefix: Some(prefix.clone()),
                page,
            });
        }
    }

    Some(SitemapRoute::Listing {
        bucket: name.to_string(),
        prefix: None,
        page,
    })
}

/// Public URL of one listing page for a stored bucket.
pub fn listing_url(site_url: &str, bucket: &str, page: u32) -> String {
    format!(
        "{}/{}-sitemap-{}.xml",
        site_url.trim_end_matches('/'),
        bucket,
        page
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(bucket: &str, prefix: Option<&str>, page: u32) -> Option<SitemapRoute> {
        Some(SitemapRoute::Listing {
            bucket: bucket.into(),
            prefix: prefix.map(String::from),
            page,
        })
    }

    #[test]
    fn test_prefixed_and_generic_listings() {
        let s = SitemapSettings::default();
        assert_eq!(
            resolve("/cpt-product-sitemap-2.xml", &s),
            listing("product", Some("cpt"), 2)
        );
        assert_eq!(resolve("/post-sitemap-1.xml", &s), listing("post", None, 1));
        assert_eq!(
            resolve("/tax-post_tag-sitemap-3.xml", &s),
            listing("post_tag", Some("tax"), 3)
        );
    }

    #[test]
    fn test_index_and_stylesheet() {
        let s = SitemapSettings::default();
        assert_eq!(resolve("/sitemap.xml", &s), Some(SitemapRoute::Index));
        assert_eq!(
            resolve("/page-stylesheet.xsl", &s),
            Some(SitemapRoute::Stylesheet {
                object_type: "page".into()
            })
        );
    }

    #[test]
    fn test_custom_slug_and_prefixes() {
        let s = SitemapSettings {
            sitemap_slug: "site-index.xml".into(),
            cpt_prefix: "type".into(),
            taxonomy_prefix: "term".into(),
            ..Default::default()
        };
        assert_eq!(resolve("/site-index.xml", &s), Some(SitemapRoute::Index));
        assert_eq!(resolve("/sitemap.xml", &s), None);
        assert_eq!(
            resolve("/term-genre-sitemap-1.xml", &s),
            listing("genre", Some("term"), 1)
        );
        assert_eq!(
            resolve("/cpt-product-sitemap-1.xml", &s),
            listing("cpt-product", None, 1)
        );
    }

    #[test]
    fn test_bare_prefix_is_a_generic_bucket() {
        let s = SitemapSettings::default();
        assert_eq!(resolve("/cpt-sitemap-1.xml", &s), listing("cpt", None, 1));
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        let s = SitemapSettings::default();
        assert_eq!(resolve("/post-sitemap-0.xml", &s), None);
        assert_eq!(resolve("/post-sitemap.xml", &s), None);
        assert_eq!(resolve("/post-sitemap-1.json", &s), None);
        assert_eq!(resolve("/../etc-sitemap-1.xml", &s), None);
        assert_eq!(resolve("/", &s), None);
    }

    #[test]
    fn test_listing_url_round_trips() {
        let s = SitemapSettings::default();
        let url = listing_url("https://example.com/", "cpt-post", 4);
        assert_eq!(url, "https://example.com/cpt-post-sitemap-4.xml");
        assert_eq!(
            resolve("/cpt-post-sitemap-4.xml", &s),
            listing("post", Some("cpt"), 4)
        );
    }
}
