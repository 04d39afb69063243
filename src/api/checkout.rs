use axum::{
    extract::{Path, State},
    response::Html,
};
use html_escape::encode_double_quoted_attribute as attr;

use super::AppState;
use crate::error::AppError;
use crate::payments::request_builder::PaymentForm;
use crate::payments::types::OrderId;

/// Self-submitting form that carries the signed envelope to the hosted payment page.
pub fn render_redirect_form(form: &PaymentForm) -> String {
    let inputs: String = form
        .envelope
        .form_fields()
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}">"#,
                attr(name),
                attr(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n    ");

    format!(
        r#"<!DOCTYPE html>
<html>
<body onload="document.forms['payuni'].submit()">
  <form id="payuni" name="payuni" method="post" action="{}">
    {}
    <noscript><button type="submit">Continue to PAYUNi</button></noscript>
  </form>
</body>
</html>"#,
        attr(&form.action_url),
        inputs
    )
}

/// GET /checkout/orders/{id}/pay
pub async fn pay(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Html<String>, AppError> {
    let form = state.request_builder.build(order_id).await?;
    Ok(Html(render_redirect_form(&form)))
}
