use crate::services::mapping::{HttpMethod, MappingSet, ResponseParser, ToolMapping};
use std::collections::BTreeMap;

/// Product lookup tools used when no mapping file is usable.
pub fn default_mapping_set() -> MappingSet {
    let mut tools = BTreeMap::new();
    tools.insert(
        "get_product".to_string(),
        ToolMapping::new("/api/products/{product_id}", HttpMethod::Get)
            .describe("Get detailed information about a specific product by ID")
            .required(&["product_id"])
            .parser("parse_product"),
    );
    tools.insert(
        "search_products".to_string(),
        ToolMapping::new("/api/products/search", HttpMethod::Get)
            .describe("Search for products by name, description, or category")
            .required(&["query"])
            .optional(&["category", "limit"])
            .param_type("limit", "integer")
            .parser("parse_products_list"),
    );
    tools.insert(
        "get_categories".to_string(),
        ToolMapping::new("/api/categories", HttpMethod::Get)
            .describe("Get all available product categories")
            .parser("parse_categories"),
    );
    tools.insert(
        "get_products_by_category".to_string(),
        ToolMapping::new("/api/products/category/{category}", HttpMethod::Get)
            .describe("Get all products in a specific category")
            .required(&["category"])
            .optional(&["limit"])
            .param_type("limit", "integer")
            .parser("parse_products_list"),
    );

    let product_fields = ["name", "description", "price", "category", "in_stock"];
    let mut parsers = BTreeMap::new();
    parsers.insert(
        "parse_product".to_string(),
        ResponseParser::single_item("id", &product_fields),
    );
    parsers.insert(
        "parse_products_list".to_string(),
        ResponseParser::list(
            "products",
            &["id", "name", "description", "price", "category", "in_stock"],
        ),
    );
    parsers.insert(
        "parse_categories".to_string(),
        ResponseParser::list("categories", &["id", "name", "description"]),
    );

    MappingSet::trusted(tools, parsers)
}
