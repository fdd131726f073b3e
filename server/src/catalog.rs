//! Prompt catalog loaded once at start-up
//!
//! Prompts are grouped in category files. The catalog is read-only after
//! loading, so it can be shared behind an `Arc` without locking.

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use shared::Prompt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN_CATEGORIES: [&str; 3] = [
    include_str!("../prompts/01_everyday.json"),
    include_str!("../prompts/02_travel.json"),
    include_str!("../prompts/03_opinions.json"),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read prompts from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid category file {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate prompt id {0}")]
    DuplicateId(String),
}

/// On-disk layout of one category file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryFile {
    category_id: String,
    category_name: String,
    cards: Vec<CardEntry>,
}

#[derive(Debug, Deserialize)]
struct CardEntry {
    id: String,
    text: String,
    #[serde(default, rename = "scale0to100")]
    scale_0_to_100: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    prompts: Vec<Prompt>,
    categories: usize,
}

impl PromptCatalog {
    /// Builds a catalog from prompts directly. Ids must be unique.
    pub fn from_prompts(prompts: Vec<Prompt>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        let mut categories = HashSet::new();
        for prompt in prompts {
            categories.insert(prompt.category_id.clone());
            catalog.push(prompt)?;
        }
        catalog.categories = categories.len();
        Ok(catalog)
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for (index, content) in BUILTIN_CATEGORIES.iter().enumerate() {
            catalog.add_category(&format!("builtin-{}", index), content)?;
        }
        info!(
            "Loaded {} built-in prompts from {} categories",
            catalog.len(),
            catalog.categories
        );
        Ok(catalog)
    }

    /// Loads every `*.json` category file in `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let io_err = |source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut catalog = Self::default();
        for path in &files {
            let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            catalog.add_category(&path.display().to_string(), &content)?;
        }

        info!(
            "Loaded {} prompts from {} categories in {}",
            catalog.len(),
            catalog.categories,
            dir.display()
        );
        Ok(catalog)
    }

    fn add_category(&mut self, name: &str, content: &str) -> Result<(), CatalogError> {
        let category: CategoryFile =
            serde_json::from_str(content).map_err(|source| CatalogError::Parse {
                name: name.to_string(),
                source,
            })?;

        for card in category.cards {
            self.push(Prompt {
                id: card.id,
                category_id: category.category_id.clone(),
                category_name: category.category_name.clone(),
                text: card.text,
                bounded_scale: card.scale_0_to_100,
            })?;
        }
        self.categories += 1;
        Ok(())
    }

    fn push(&mut self, prompt: Prompt) -> Result<(), CatalogError> {
        if self.get(&prompt.id).is_some() {
            return Err(CatalogError::DuplicateId(prompt.id));
        }
        self.prompts.push(prompt);
        Ok(())
    }

    /// Picks a prompt uniformly among those not in `exclude`.
    ///
    /// Returns `None` once every prompt has been excluded.
    pub fn sample<R: Rng + ?Sized>(&self, exclude: &[String], rng: &mut R) -> Option<Prompt> {
        let available: Vec<&Prompt> = self
            .prompts
            .iter()
            .filter(|p| !exclude.contains(&p.id))
            .collect();
        available.choose(rng).map(|p| (*p).clone())
    }

    pub fn get(&self, id: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn category_count(&self) -> usize {
        self.categories
    }
}
