use duckdb::{params, Connection};
use tracing::{debug, info};

const CREATE_SAMPLE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sales_data (
    id INTEGER PRIMARY KEY,
    region VARCHAR NOT NULL,
    customer_name VARCHAR NOT NULL,
    product_name VARCHAR NOT NULL,
    sales_amount DECIMAL(10,2) NOT NULL,
    date_created DATE NOT NULL,
    transaction_count INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    name VARCHAR NOT NULL,
    category VARCHAR NOT NULL,
    price DECIMAL(10,2) NOT NULL
);

CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY,
    name VARCHAR NOT NULL,
    email VARCHAR NOT NULL,
    region VARCHAR NOT NULL,
    signup_date DATE NOT NULL
);
"#;

// (region, customer, product, amount, date)
const SALES: [(&str, &str, &str, f64, &str); 12] = [
    ("North America", "Acme Corp", "Widget A", 2500.00, "2024-10-15"),
    ("North America", "Tech Solutions", "Widget B", 1800.00, "2024-10-20"),
    ("Europe", "Euro Systems", "Widget A", 3200.00, "2024-11-01"),
    ("Europe", "Nordic Ltd", "Widget C", 2100.00, "2024-11-10"),
    ("Asia Pacific", "Pacific Trading", "Widget B", 2800.00, "2024-11-15"),
    ("Asia Pacific", "Orient Corp", "Widget A", 1950.00, "2024-11-20"),
    ("Latin America", "Sol Industries", "Widget C", 1650.00, "2024-12-01"),
    ("Latin America", "Mercado Corp", "Widget A", 2200.00, "2024-12-05"),
    ("North America", "Innovation Inc", "Widget B", 3100.00, "2024-12-10"),
    ("Europe", "Alpine Group", "Widget A", 2750.00, "2024-12-12"),
    ("Asia Pacific", "Dragon Enterprises", "Widget C", 2400.00, "2024-12-15"),
    ("North America", "Future Tech", "Widget A", 1900.00, "2024-12-18"),
];

const PRODUCTS: [(&str, &str, f64); 5] = [
    ("Widget A", "Electronics", 99.99),
    ("Widget B", "Electronics", 149.99),
    ("Widget C", "Software", 199.99),
    ("Pro Widget", "Electronics", 299.99),
    ("Widget Suite", "Software", 499.99),
];

const CUSTOMERS: [(&str, &str, &str, &str); 5] = [
    ("Acme Corp", "contact@acme.com", "North America", "2024-01-15"),
    ("Tech Solutions", "info@techsol.com", "North America", "2024-02-20"),
    ("Euro Systems", "hello@eurosys.eu", "Europe", "2024-03-10"),
    ("Pacific Trading", "sales@pacific.com", "Asia Pacific", "2024-04-05"),
    ("Sol Industries", "contact@sol.com", "Latin America", "2024-05-12"),
];

/// Creates the sample sales tables and fills them once.
pub fn seed_sample_data(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_SAMPLE_TABLES)?;

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM sales_data", [], |row| row.get(0))?;
    if existing > 0 {
        debug!("Sample data already present ({} sales rows)", existing);
        return Ok(());
    }

    let mut insert_sale = conn.prepare(
        "INSERT INTO sales_data (id, region, customer_name, product_name, sales_amount, date_created)
         VALUES (?, ?, ?, ?, ?, CAST(? AS DATE))",
    )?;
    for (i, (region, customer, product, amount, date)) in SALES.iter().enumerate() {
        insert_sale.execute(params![i as i64 + 1, region, customer, product, amount, date])?;
    }

    let mut insert_product =
        conn.prepare("INSERT INTO products (id, name, category, price) VALUES (?, ?, ?, ?)")?;
    for (i, (name, category, price)) in PRODUCTS.iter().enumerate() {
        insert_product.execute(params![i as i64 + 1, name, category, price])?;
    }

    let mut insert_customer = conn.prepare(
        "INSERT INTO customers (id, name, email, region, signup_date)
         VALUES (?, ?, ?, ?, CAST(? AS DATE))",
    )?;
    for (i, (name, email, region, date)) in CUSTOMERS.iter().enumerate() {
        insert_customer.execute(params![i as i64 + 1, name, email, region, date])?;
    }

    info!(
        "Seeded sample dataset: {} sales, {} products, {} customers",
        SALES.len(),
        PRODUCTS.len(),
        CUSTOMERS.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_twice_does_not_duplicate_rows() {
        let conn = Connection::open_in_memory().unwrap();
        seed_sample_data(&conn).unwrap();
        seed_sample_data(&conn).unwrap();

        let sales: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales_data", [], |row| row.get(0))
            .unwrap();
        let regions: i64 = conn
            .query_row("SELECT COUNT(DISTINCT region) FROM sales_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sales, 12);
        assert_eq!(regions, 4);
    }
}
