use axum::{routing::get, Json, Router};

use crate::state::AppState;

/// The clinic roster is a fixed label list, not a managed resource.
pub const DOCTORS: [&str; 3] = ["Dr. Somchai", "Dr. Somying", "Dr. Damrong"];

pub fn router() -> Router<AppState> {
    Router::new().route("/doctors", get(list_doctors))
}

pub async fn list_doctors() -> Json<Vec<&'static str>> {
    Json(DOCTORS.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roster_has_three_labels() {
        let Json(doctors) = list_doctors().await;
        assert_eq!(doctors.len(), 3);
        assert!(doctors.contains(&"Dr. Somchai"));
    }
}
