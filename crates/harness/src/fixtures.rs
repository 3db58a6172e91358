use std::sync::Arc;

use erpbridge_remote::{MemoryRemote, RemoteError, ServerVersion};
use serde_json::json;

pub const PARTNER: &str = "res.partner";
pub const CATEGORY: &str = "res.partner.category";
pub const ORDER: &str = "sale.order";

/// Seeded partner ids.
pub const ACME: i64 = 1;
pub const GLOBEX: i64 = 2;
pub const INITECH: i64 = 3;

/// Seeded category ids.
pub const RETAIL: i64 = 1;
pub const WHOLESALE: i64 = 2;
pub const VIP: i64 = 3;

/// Order workflow signal known to the server.
pub const ORDER_CONFIRM: &str = "order_confirm";

/// A store with partners, partner categories and sale orders.
///
/// Partners: Acme (active, Retail + VIP), Globex (inactive, Wholesale) and
/// Initech (active, child of Acme). One draft order for Acme.
pub fn seeded_remote(version: ServerVersion) -> Result<Arc<MemoryRemote>, RemoteError> {
    let remote = MemoryRemote::new(version);

    remote.define_model(
        CATEGORY,
        json!({
            "name": {"type": "char", "string": "Category Name", "required": true},
        }),
    );
    remote.define_model(
        PARTNER,
        json!({
            "name": {"type": "char", "string": "Name", "required": true, "size": 128},
            "active": {"type": "boolean", "string": "Active"},
            "credit_limit": {"type": "float", "string": "Credit Limit"},
            "employee_count": {"type": "integer", "string": "Employees"},
            "birthday": {"type": "date", "string": "Birthday"},
            "last_login": {"type": "datetime", "string": "Last Login"},
            "parent_id": {"type": "many2one", "relation": PARTNER, "string": "Parent"},
            "child_ids": {"type": "one2many", "relation": PARTNER, "string": "Contacts"},
            "category_id": {"type": "many2many", "relation": CATEGORY, "string": "Tags"},
            "state": {
                "type": "selection",
                "string": "Status",
                "selection": [["draft", "Draft"], ["open", "Open"], ["closed", "Closed"]],
            },
            "display_label": {
                "type": "char",
                "string": "Label",
                "func_method": true,
                "store": false,
                "readonly": 1,
            },
            "notes": {"type": "text", "string": "Notes"},
        }),
    );
    remote.define_model(
        ORDER,
        json!({
            "name": {"type": "char", "string": "Order Reference", "required": true},
            "partner_id": {"type": "many2one", "relation": PARTNER, "required": true},
            "amount_total": {"type": "float", "string": "Total"},
            "state": {
                "type": "selection",
                "selection": [["draft", "Quotation"], ["sale", "Sales Order"], ["cancel", "Cancelled"]],
                "states": {"sale": [["readonly", true]], "cancel": [["readonly", true]]},
            },
        }),
    );

    for name in ["Retail", "Wholesale", "VIP"] {
        remote.insert(CATEGORY, json!({"name": name}))?;
    }
    remote.insert(
        PARTNER,
        json!({
            "name": "Acme",
            "active": true,
            "credit_limit": 1000.0,
            "employee_count": 120,
            "birthday": "1970-01-12",
            "last_login": "2024-03-01 09:30:00",
            "category_id": [RETAIL, VIP],
            "state": "open",
        }),
    )?;
    remote.insert(
        PARTNER,
        json!({
            "name": "Globex",
            "active": false,
            "credit_limit": 250.5,
            "employee_count": 12,
            "category_id": [WHOLESALE],
            "state": "closed",
        }),
    )?;
    remote.insert(
        PARTNER,
        json!({
            "name": "Initech",
            "active": true,
            "credit_limit": 0.0,
            "parent_id": ACME,
            "state": "draft",
        }),
    )?;
    remote.insert(
        ORDER,
        json!({"name": "SO001", "partner_id": ACME, "amount_total": 99.5, "state": "draft"}),
    )?;
    remote.add_workflow_signal(ORDER, ORDER_CONFIRM)?;

    remote.clear_calls();
    Ok(Arc::new(remote))
}
