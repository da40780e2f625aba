//! Product matcher patterns.
//!
//! | Pattern            | Matches                               | Score |
//! |--------------------|---------------------------------------|-------|
//! | `*`                | every product                         | 1     |
//! | `prefix*`          | product id / category name prefix     | 3 / 2 |
//! | `category/product` | one product                           | 3     |
//! | `category`         | every product in the category         | 2     |
//!
//! A score of zero or less means "no match".

use service_core::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductMatcher {
    Product { category: String, id: String },
    Category { category: String },
    PrefixAny { prefix: String },
    Any,
}

const NO_MATCH: i32 = -1;

impl ProductMatcher {
    pub fn parse(pattern: &str) -> Result<Self, AppError> {
        let trimmed = pattern.trim();

        if trimmed.contains('\n') {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Product matcher cannot contain new lines."
            )));
        }

        if trimmed.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Product matcher cannot be empty."
            )));
        }

        if trimmed == "*" {
            return Ok(ProductMatcher::Any);
        }

        if let Some(prefix) = trimmed.strip_suffix('*') {
            return Ok(ProductMatcher::PrefixAny {
                prefix: prefix.to_string(),
            });
        }

        match trimmed.split_once('/') {
            Some((category, id)) => {
                if id.contains('/') {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Product matcher contains too many slashes."
                    )));
                }

                Ok(ProductMatcher::Product {
                    category: category.trim().to_string(),
                    id: id.trim().to_string(),
                })
            }
            None => Ok(ProductMatcher::Category {
                category: trimmed.to_string(),
            }),
        }
    }

    /// Score of this matcher against a product in `category` named `id`.
    pub fn score(&self, category: &str, id: &str) -> i32 {
        match self {
            ProductMatcher::Product {
                category: c,
                id: p,
            } => {
                if c == category && p == id {
                    3
                } else {
                    NO_MATCH
                }
            }
            ProductMatcher::Category { category: c } => {
                if c == category {
                    2
                } else {
                    NO_MATCH
                }
            }
            ProductMatcher::PrefixAny { prefix } => {
                if id.starts_with(prefix.as_str()) {
                    3
                } else if category.starts_with(prefix.as_str()) {
                    2
                } else {
                    NO_MATCH
                }
            }
            ProductMatcher::Any => 1,
        }
    }

    pub fn matches(&self, category: &str, id: &str) -> bool {
        self.score(category, id) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_pattern_shape() {
        assert_eq!(ProductMatcher::parse(" * ").unwrap(), ProductMatcher::Any);
        assert_eq!(
            ProductMatcher::parse("u1-*").unwrap(),
            ProductMatcher::PrefixAny {
                prefix: "u1-".to_string()
            }
        );
        assert_eq!(
            ProductMatcher::parse("storage / home").unwrap(),
            ProductMatcher::Product {
                category: "storage".to_string(),
                id: "home".to_string()
            }
        );
        assert_eq!(
            ProductMatcher::parse("storage").unwrap(),
            ProductMatcher::Category {
                category: "storage".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(matches!(
            ProductMatcher::parse("a/b/c"),
            Err(AppError::BadRequest(_))
        ));
        assert!(ProductMatcher::parse("a\nb").is_err());
        assert!(ProductMatcher::parse("   ").is_err());
    }

    #[test]
    fn scores_follow_specificity() {
        let product = ProductMatcher::parse("u1-standard/u1-standard-4").unwrap();
        assert_eq!(product.score("u1-standard", "u1-standard-4"), 3);
        assert!(!product.matches("u1-standard", "u1-standard-8"));

        let category = ProductMatcher::parse("u1-standard").unwrap();
        assert_eq!(category.score("u1-standard", "u1-standard-8"), 2);
        assert!(!category.matches("storage", "home"));

        let prefix = ProductMatcher::parse("u1-*").unwrap();
        assert_eq!(prefix.score("compute", "u1-gpu"), 3);
        assert_eq!(prefix.score("u1-standard", "big"), 2);
        assert!(!prefix.matches("storage", "home"));

        assert!(ProductMatcher::Any.matches("anything", "at-all"));
    }
}
