// src/services/menu.rs

//! Cafeteria menu page scraper.
//!
//! Flattens the first `<table>` of a menu page into pipe-separated rows. The
//! text is only fed to the generator, so no attempt is made to understand the
//! table layout.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::CafeteriaInfo;
use crate::services::MenuSource;

/// Placeholder text when a page has no table.
pub const NO_MENU: &str = "No menu found.";

/// A single cafeteria's weekly menu page.
pub struct CafeteriaPage {
    name: String,
    url: String,
    client: Client,
}

impl CafeteriaPage {
    pub fn new(info: &CafeteriaInfo, client: Client) -> Self {
        Self {
            name: info.name.clone(),
            url: info.url.clone(),
            client,
        }
    }

    /// Build one page per configured cafeteria, sharing a client.
    pub fn from_config(cafeterias: &[CafeteriaInfo], client: &Client) -> Vec<Self> {
        cafeterias
            .iter()
            .map(|info| Self::new(info, client.clone()))
            .collect()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MenuSource for CafeteriaPage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_menu(&self) -> Result<String> {
        log::debug!("Fetching {} from {}", self.name, self.url);
        let html = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        extract_table_text(&self.name, &html)
    }
}

/// Flatten the first table of `html` into one line per row.
pub fn extract_table_text(source_name: &str, html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let table_sel = parse_selector(source_name, "table")?;
    let row_sel = parse_selector(source_name, "tr")?;
    let cell_sel = parse_selector(source_name, "th, td")?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(NO_MENU.to_string());
    };

    let mut text = String::new();
    for row in table.select(&row_sel) {
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|cell| {
                cell.text()
                    .collect::<String>()
                    .trim()
                    .replace('\n', " ")
            })
            .collect();
        text.push_str(&cells.join(" | "));
        text.push('\n');
    }
    Ok(text)
}

fn parse_selector(source_name: &str, s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::scrape(source_name, format!("selector '{s}': {e:?}")))
}
