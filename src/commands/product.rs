//! `product` commands.

use super::{or_unknown, paging_args};
use crate::dispatch::{CommandDescriptor, DataSource, HandlerContext, ParamSpec, Payload};
use crate::policy::tier::Tier;
use crate::protocol::models::{NewProduct, Page, Product};
use crate::validate::{sanitize_for_display, validate_price, MAX_IDENTITY_LEN};
use crate::BotError;
use serde_json::json;

/// Currencies accepted by `product create`.
pub const CURRENCY_CHOICES: &[&str] = &["USD", "EUR", "GBP"];

pub(crate) fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "product",
            Some("create"),
            "Create a product",
            crate::handler!(create),
        )
        .min_tier(Tier::Admin)
        .param(ParamSpec::string("name", "Product name").required())
        .param(ParamSpec::string("price", "Price, e.g. 9.99").required())
        .param(ParamSpec::choice("currency", "Currency", CURRENCY_CHOICES)),
        CommandDescriptor::new("product", Some("info"), "Show a product", crate::handler!(info))
            .param(ParamSpec::string("id", "Product id").required()),
        CommandDescriptor::new("product", Some("list"), "List products", crate::handler!(list))
            .param(ParamSpec::integer("page", "Page number", 1, 100))
            .param(ParamSpec::integer("limit", "Products per page", 1, 50)),
    ]
}

async fn create(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let name = ctx.required_str("name")?;
    if name.chars().count() > 100 {
        return Err(BotError::invalid("name", "longer than 100 characters"));
    }
    let price = validate_price(ctx.required_str("price")?)?;
    let currency = ctx.str_arg("currency").unwrap_or("USD");
    ctx.reply.defer();

    let product = ctx
        .api
        .create_product(&NewProduct {
            name: name.to_string(),
            price,
            currency: currency.to_string(),
        })
        .await?;
    tracing::info!(created_by = %ctx.caller().identity, "product created");
    Ok(render_product("Product Created", &product))
}

async fn info(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let id = ctx.required_str("id")?;
    if id.len() > MAX_IDENTITY_LEN {
        return Err(BotError::invalid("id", "too long"));
    }
    ctx.reply.defer();
    let product = ctx.api.get_product(id).await?;
    Ok(render_product("Product Information", &product))
}

async fn list(ctx: &HandlerContext) -> Result<Payload, BotError> {
    let (page, limit) = paging_args(ctx);
    ctx.reply.defer();
    let listing = ctx.api.list_products(page, limit).await?;
    Ok(render_listing("Products", page, &listing))
}

pub(crate) fn format_price(product: &Product) -> String {
    match product.price {
        Some(price) => format!(
            "{:.2} {}",
            price,
            product.currency.as_deref().unwrap_or("USD")
        ),
        None => "Unknown".to_string(),
    }
}

fn render_product(title: &str, product: &Product) -> Payload {
    Payload::new(title, DataSource::Remote)
        .inline_field("Name", or_unknown(product.name.as_deref()))
        .inline_field("ID", or_unknown(product.id.as_deref()))
        .inline_field("Price", format_price(product))
        .inline_field("Created", or_unknown(product.created_at.as_deref()))
        .data(product)
}

/// One field per product, shared with `admin products`.
pub(crate) fn render_listing(title: &str, page: u32, listing: &Page<Product>) -> Payload {
    let mut payload = Payload::new(format!("{} (Page {})", title, page), DataSource::Remote);
    if listing.items.is_empty() {
        return payload.description("No products found.");
    }
    payload = payload.description(format!("Total: {} products", listing.total));
    for product in &listing.items {
        payload = payload.field(
            sanitize_for_display(or_unknown(product.name.as_deref())),
            format!(
                "ID: {}\nPrice: {}",
                or_unknown(product.id.as_deref()),
                format_price(product)
            ),
        );
    }
    payload.data(&json!({ "page": page, "total": listing.total, "items": listing.items }))
}
