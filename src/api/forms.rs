//! Submitted form data
//!
//! HTML forms arrive either url-encoded or as multipart bodies (when they
//! carry files). Both are reduced to ordered `(name, value)` pairs, which
//! keeps repeated keys such as the `products` checkboxes of the order form.

use axum::extract::Multipart;

use crate::api::middleware::ApiError;
use crate::models::{FieldValue, OrderForm, ProductForm, UpdateProfileInput};
use crate::services::{FormErrors, UploadedFile};

/// Fields and files of a multipart body
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, UploadedFile)>,
}

impl MultipartForm {
    /// Read the whole body; file inputs left empty by the browser are skipped
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation_error(format!("Failed to read field {}: {}", name, e)))?;

            match file_name {
                Some(file_name) => {
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files.push((
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            data: data.to_vec(),
                        },
                    ));
                }
                None => form.fields.push((name, String::from_utf8_lossy(&data).into_owned())),
            }
        }

        Ok(form)
    }

    pub fn file(&self, name: &str) -> Option<UploadedFile> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, f)| f.clone())
    }

    pub fn files(&self, name: &str) -> Vec<UploadedFile> {
        self.files
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, f)| f.clone())
            .collect()
    }
}

/// First value submitted under `name`
pub fn value<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
}

/// Every value submitted under `name`
pub fn values<'a>(pairs: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Checkbox semantics: present and not "off"/"false"
pub fn checkbox(pairs: &[(String, String)], name: &str) -> bool {
    matches!(value(pairs, name), Some(v) if !matches!(v, "" | "off" | "false" | "0"))
}

/// Product fields from a submitted form; every field is always present
pub fn product_form(pairs: &[(String, String)]) -> ProductForm {
    let text = |name: &str| Some(value(pairs, name).unwrap_or("").to_string());
    ProductForm {
        name: text("name"),
        description: text("description"),
        price: value(pairs, "price").map(FieldValue::from),
        discount: value(pairs, "discount")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(FieldValue::from),
    }
}

/// Order fields from a submitted form; unparsable ids become field errors
pub fn order_form(pairs: &[(String, String)]) -> Result<OrderForm, FormErrors> {
    let mut errors = FormErrors::new();

    let user = match value(pairs, "user").map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add("user", "Select a valid choice. That choice is not one of the available choices.");
                None
            }
        },
    };

    let mut products = Vec::new();
    for raw in values(pairs, "products") {
        match raw.trim().parse::<i64>() {
            Ok(id) => products.push(id),
            Err(_) => errors.add("products", format!("\u{201c}{}\u{201d} is not a valid value.", raw)),
        }
    }

    errors.into_result()?;
    Ok(OrderForm {
        delivery_address: Some(value(pairs, "delivery_address").unwrap_or("").to_string()),
        promocode: Some(value(pairs, "promocode").unwrap_or("").to_string()),
        user,
        products: Some(products),
    })
}

/// Personal data and profile fields of the user update form
pub fn profile_form(pairs: &[(String, String)]) -> UpdateProfileInput {
    let text = |name: &str| value(pairs, name).unwrap_or("").trim().to_string();
    UpdateProfileInput {
        first_name: text("first_name"),
        last_name: text("last_name"),
        email: text("email"),
        bio: value(pairs, "bio").unwrap_or("").to_string(),
        agreement_accepted: checkbox(pairs, "agreement_accepted"),
    }
}

/// Form fields as a template-friendly map
pub fn echo(pairs: &[(String, String)], names: &[&str]) -> serde_json::Map<String, serde_json::Value> {
    names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                serde_json::Value::String(value(pairs, name).unwrap_or("").to_string()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_order_form_repeated_products() {
        let form = order_form(&pairs(&[
            ("delivery_address", "Main st"),
            ("promocode", "SALE"),
            ("user", "2"),
            ("products", "1"),
            ("products", "3"),
        ]))
        .unwrap();

        assert_eq!(form.user, Some(2));
        assert_eq!(form.products, Some(vec![1, 3]));
        assert_eq!(form.delivery_address.as_deref(), Some("Main st"));
    }

    #[test]
    fn test_order_form_bad_ids() {
        let errors = order_form(&pairs(&[("user", "x"), ("products", "y")])).unwrap_err();
        assert!(errors.get("user").is_some());
        assert!(errors.get("products").is_some());

        let empty_user = order_form(&pairs(&[("user", "")])).unwrap();
        assert_eq!(empty_user.user, None);
        assert_eq!(empty_user.products, Some(vec![]));
    }

    #[test]
    fn test_product_form_blank_discount() {
        let form = product_form(&pairs(&[("name", "Laptop"), ("price", "10.5"), ("discount", " ")]));
        assert_eq!(form.name.as_deref(), Some("Laptop"));
        assert_eq!(form.description.as_deref(), Some(""));
        assert!(form.discount.is_none());
        assert_eq!(form.price.map(|p| p.as_text()), Some("10.5".to_string()));
    }

    #[test]
    fn test_checkbox_and_profile_form() {
        let input = profile_form(&pairs(&[
            ("first_name", " Ann "),
            ("email", "ann@example.com"),
            ("agreement_accepted", "on"),
        ]));
        assert_eq!(input.first_name, "Ann");
        assert!(input.agreement_accepted);
        assert!(!checkbox(&pairs(&[("agreement_accepted", "off")]), "agreement_accepted"));
        assert!(!checkbox(&[], "agreement_accepted"));
    }

    #[test]
    fn test_echo() {
        let map = echo(&pairs(&[("name", "x")]), &["name", "price"]);
        assert_eq!(map["name"], "x");
        assert_eq!(map["price"], "");
    }
}
