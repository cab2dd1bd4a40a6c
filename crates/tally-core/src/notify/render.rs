//! Email rendering
//!
//! Every notification renders to a subject plus matching plain-text and HTML
//! bodies. Delivery backends decide what to do with them.

use std::fmt::Write;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Category, Group};
use crate::reminders::PaymentReminder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Escape text for an HTML body
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

fn row_errors_text(row_errors: &[String], text: &mut String, html: &mut String) {
    let _ = writeln!(text, "\nSkipped rows:");
    html.push_str("<h3>Skipped rows</h3><ul>");
    for err in row_errors {
        let _ = writeln!(text, "  - {}", err);
        let _ = write!(html, "<li>{}</li>", escape_html(err));
    }
    html.push_str("</ul>");
}

/// Expense summary with each member's debt under `scale_factor`
pub fn render_summary(group: &Group, row_errors: &[String], scale_factor: Decimal) -> RenderedEmail {
    let subject = match group.date_range() {
        Some((oldest, newest)) => format!("Expense summary {} to {}", oldest, newest),
        None => "Expense summary".to_string(),
    };

    let mut text = String::new();
    let mut html = String::from("<html><body>");
    let _ = writeln!(text, "{}\n", subject);
    let _ = write!(html, "<h2>{}</h2>", escape_html(&subject));

    let _ = writeln!(text, "Total shared expenses: {}", money(group.expenses()));
    let _ = write!(
        html,
        "<p>Total shared expenses: <b>{}</b></p><table><tr><th>Person</th><th>Spent</th><th>Owes</th></tr>",
        money(group.expenses())
    );

    for person in &group.members {
        let debt = group.debt(person, scale_factor);
        let _ = writeln!(
            text,
            "{}: spent {}, owes {}",
            person.name,
            money(person.expenses(None)),
            money(debt)
        );
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&person.name),
            money(person.expenses(None)),
            money(debt)
        );
    }
    html.push_str("</table>");

    // Category breakdown only makes sense for a pair
    if let [p1, p2] = group.members.as_slice() {
        let _ = writeln!(text, "\n{} minus {} by category:", p1.name, p2.name);
        let _ = write!(
            html,
            "<h3>{} minus {} by category</h3><ul>",
            escape_html(&p1.name),
            escape_html(&p2.name)
        );
        for category in Category::TRACKED.iter() {
            let diff = group.expenses_difference(p1, p2, Some(category));
            if diff.is_zero() {
                continue;
            }
            let _ = writeln!(text, "  {}: {}", category, money(diff));
            let _ = write!(html, "<li>{}: {}</li>", escape_html(category.as_str()), money(diff));
        }
        html.push_str("</ul>");
    }

    if !row_errors.is_empty() {
        row_errors_text(row_errors, &mut text, &mut html);
    }
    html.push_str("</body></html>");

    RenderedEmail { subject, text, html }
}

/// Every row error from an upload with no usable rows
pub fn render_validation_failure(row_errors: &[String]) -> RenderedEmail {
    let subject = "Transaction upload failed validation".to_string();
    let mut text = String::from("No transactions could be imported from the uploaded file.\n");
    let mut html = String::from(
        "<html><body><p>No transactions could be imported from the uploaded file.</p>",
    );
    row_errors_text(row_errors, &mut text, &mut html);
    html.push_str("</body></html>");
    RenderedEmail { subject, text, html }
}

pub fn render_payment_reminders(reminders: &[PaymentReminder]) -> RenderedEmail {
    let subject = match reminders {
        [single] => format!("Payment due {} for {}", single.due_date, single.card_name),
        _ => format!("{} card payments due soon", reminders.len()),
    };

    let mut text = String::new();
    let mut html = String::from(
        "<html><body><table><tr><th>Card</th><th>Due</th><th>Balance</th><th>Pay</th><th>Utilization</th></tr>",
    );
    for r in reminders {
        let utilization = (r.utilization * Decimal::ONE_HUNDRED).round_dp(1);
        let _ = writeln!(
            text,
            "{} (due {}): balance {}, pay {} to reach 10% utilization (now {}%)",
            r.card_name,
            r.due_date,
            money(r.current_balance),
            money(r.target_payment),
            utilization
        );
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}%</td></tr>",
            escape_html(&r.card_name),
            r.due_date,
            money(r.current_balance),
            money(r.target_payment),
            utilization
        );
    }
    html.push_str("</table></body></html>");

    RenderedEmail { subject, text, html }
}
