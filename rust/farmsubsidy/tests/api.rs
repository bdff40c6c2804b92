mod support;

use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{column, harness, harness_with, read_text, results, API_KEY, AUTHENTICATED};

#[tokio::test]
async fn health_and_auth_status() {
    let harness = harness().await;

    let (status, body) = harness.get_json("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (_, body) = harness.get_json("/authenticated").await;
    assert_eq!(body, json!({"status": false}));

    let (_, body) = harness
        .get_json_with("/authenticated", &[AUTHENTICATED])
        .await;
    assert_eq!(body, json!({"status": true}));

    let (_, body) = harness
        .get_json_with("/authenticated", &[("authorization", "Bearer unknown")])
        .await;
    assert_eq!(body, json!({"status": false}));
}

#[tokio::test]
async fn countries_are_aggregated_per_country() {
    let harness = harness().await;
    let (status, body) = harness.get_json("/countries").await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["item_count"], json!(2));
    assert_eq!(body["url"], json!("http://api.test/countries"));
    assert_eq!(body["next_url"], json!(null));
    assert_eq!(column(&body, "country"), [&json!("CZ"), &json!("LU")]);

    let cz = &results(&body)[0];
    assert_eq!(cz["name"], json!("Czech Republic"));
    assert_eq!(cz["years"], json!([2015]));
    assert_eq!(cz["total_payments"], json!(3));
    assert_eq!(cz["total_recipients"], json!(2));
    assert_eq!(cz["amount_sum"], json!(1750.5));
    assert_eq!(cz["amount_max"], json!(1000.0));
    assert_eq!(cz["amount_min"], json!(250.5));

    let lu = &results(&body)[1];
    assert_eq!(lu["amount_sum"], json!(500.25));
    assert_eq!(lu["total_recipients"], json!(2));
}

#[tokio::test]
async fn filters_narrow_the_aggregation() {
    let harness = harness().await;

    let (_, body) = harness.get_json("/countries?country=LU").await;
    assert_eq!(column(&body, "country"), [&json!("LU")]);
    assert_eq!(body["query"]["country"], json!("LU"));

    let (_, body) = harness.get_json("/years?country__in=CZ,LU").await;
    assert_eq!(column(&body, "year"), [&json!(2015), &json!(2019)]);

    let (_, body) = harness.get_json("/countries?amount_sum__gt=1000").await;
    assert_eq!(column(&body, "country"), [&json!("CZ")]);
    assert_eq!(body["item_count"], json!(1));
}

#[tokio::test]
async fn recipients_merge_names_and_amounts() {
    let harness = harness().await;
    let (status, body) = harness.get_json("/recipients").await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["item_count"], json!(4));
    assert_eq!(
        column(&body, "id"),
        [&json!("cz-r1"), &json!("cz-r2"), &json!("lu-r1"), &json!("lu-r2")]
    );

    let first = &results(&body)[0];
    assert_eq!(first["name"], json!(["Agro Alfa a.s."]));
    assert_eq!(first["country"], json!(["CZ"]));
    assert_eq!(first["years"], json!([2015]));
    assert_eq!(first["total_payments"], json!(2));
    assert_eq!(first["amount_sum"], json!(1500.0));
}

#[tokio::test]
async fn recipients_filter_by_country_and_year() {
    let harness = harness().await;

    let (_, lu) = harness.get_json("/recipients?country=LU").await;
    let (_, lu_2019) = harness.get_json("/recipients?country=LU&year=2019").await;
    assert_eq!(results(&lu).len(), 2);
    assert_eq!(results(&lu), results(&lu_2019));

    let (status, lu_2018) = harness.get_json("/recipients?country=LU&year=2018").await;
    assert_eq!(status, StatusCode::OK);
    assert!(results(&lu_2018).is_empty());
    assert_eq!(lu_2018["item_count"], json!(0));
}

#[tokio::test]
async fn recipient_views_keep_their_own_shape() {
    let harness = harness().await;

    let (_, base) = harness.get_json("/recipients/base?country=LU").await;
    let (_, full) = harness.get_json("/recipients?country=LU").await;
    assert_eq!(column(&full, "id"), [&json!("lu-r1"), &json!("lu-r2")]);
    assert_eq!(results(&full)[0]["name"], json!(["Ferme Gamma"]));
    assert_eq!(results(&full)[0]["country"], json!(["LU"]));

    let (_, base_again) = harness.get_json("/recipients/base?country=LU").await;
    assert_eq!(base_again["results"], base["results"]);
    let first = &results(&base_again)[0];
    assert_eq!(first["amount_sum"], json!(380.0));
    assert!(first.get("name").is_none(), "{first}");
    assert!(first.get("address").is_none(), "{first}");
}

#[tokio::test]
async fn having_totals_do_not_depend_on_windowing() {
    let windowed = harness().await;
    let unwindowed = harness_with(|config| config.window_threshold = 0).await;

    for harness in [&windowed, &unwindowed] {
        let (status, body) = harness.get_json("/countries?amount_sum__gt=1000&limit=1").await;
        assert_eq!(status, StatusCode::OK, "body: {body}");
        assert_eq!(column(&body, "country"), [&json!("CZ")]);
        assert_eq!(body["item_count"], json!(1));
        assert_eq!(body["next_url"], json!(null));
    }
}

#[tokio::test]
async fn ordering_and_pages_come_from_one_window() {
    let harness = harness().await;

    let (_, body) = harness.get_json("/recipients?order_by=-amount_sum").await;
    assert_eq!(
        column(&body, "id"),
        [&json!("cz-r1"), &json!("lu-r1"), &json!("cz-r2"), &json!("lu-r2")]
    );
    assert_eq!(body["query"]["order_by"], json!("-amount_sum"));

    let (_, first) = harness
        .get_json("/recipients?order_by=-amount_sum&limit=2")
        .await;
    assert_eq!(column(&first, "id"), [&json!("cz-r1"), &json!("lu-r1")]);
    assert_eq!(first["item_count"], json!(4));
    assert_eq!(
        first["next_url"],
        json!("http://api.test/recipients?order_by=-amount_sum&limit=2&p=2")
    );
    assert_eq!(first["prev_url"], json!(null));

    let (_, second) = harness
        .get_json("/recipients?order_by=-amount_sum&limit=2&p=2")
        .await;
    assert_eq!(column(&second, "id"), [&json!("cz-r2"), &json!("lu-r2")]);
    assert_eq!(second["next_url"], json!(null));
    assert_eq!(
        second["prev_url"],
        json!("http://api.test/recipients?order_by=-amount_sum&limit=2&p=1")
    );
}

#[tokio::test]
async fn payments_support_numeric_lookups() {
    let harness = harness().await;

    let (_, body) = harness.get_json("/payments?amount__gte=1000").await;
    assert_eq!(column(&body, "pk"), [&json!("p-cz-1")]);
    assert_eq!(results(&body)[0]["year"], json!(2015));
    assert_eq!(results(&body)[0]["amount"], json!(1000.0));

    let (_, body) = harness
        .get_json("/payments?recipient_fingerprint=Ferme%20GAMMA&order_by=amount")
        .await;
    assert_eq!(column(&body, "pk"), [&json!("p-lu-3"), &json!("p-lu-1")]);
    assert_eq!(body["query"]["recipient_fingerprint"], json!("ferme gamma"));
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    let harness = harness().await;

    for uri in [
        "/payments?unknown=1",
        "/payments?amount_sum__gt=10",
        "/payments?recipient_id__gt=a",
        "/countries?order_by=recipient_name",
        "/years?p=0",
        "/years?output=xml",
    ] {
        let (status, body) = harness.get_json(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
        assert!(body["error"].is_string(), "{uri}: {body}");
    }
}

#[tokio::test]
async fn limits_follow_access_rules() {
    let harness = harness().await;

    let (_, body) = harness.get_json("/payments?limit=5000").await;
    assert_eq!(body["limit"], json!(1000));
    assert_eq!(body["query"]["limit"], json!(1000));

    let (_, body) = harness
        .get_json(&format!("/payments?limit=5000&api_key={API_KEY}"))
        .await;
    assert_eq!(body["limit"], json!(5000));
    assert!(body["query"].get("api_key").is_none());

    let (_, body) = harness
        .get_json_with("/payments", &[("x-api-key", API_KEY)])
        .await;
    assert_eq!(body["limit"], json!(null));
    assert_eq!(results(&body).len(), 6);

    let (_, body) = harness.get_json("/recipients/autocomplete?limit=50").await;
    assert_eq!(body["limit"], json!(10));
}

#[tokio::test]
async fn anonymous_callers_only_see_public_years() {
    let harness = harness_with(|config| config.public_years = vec![2015]).await;

    let (_, body) = harness.get_json("/recipients").await;
    assert_eq!(column(&body, "id"), [&json!("cz-r1"), &json!("cz-r2")]);

    let (_, body) = harness.get_json_with("/recipients", &[AUTHENTICATED]).await;
    assert_eq!(results(&body).len(), 4);
    assert_eq!(body["authenticated"], json!(true));

    // Aggregated public views are not restricted.
    let (_, body) = harness.get_json("/countries").await;
    assert_eq!(results(&body).len(), 2);
}

#[tokio::test]
async fn aggregation_returns_one_unpaged_row() {
    let harness = harness().await;
    let (status, body) = harness.get_json("/agg?country=CZ").await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["item_count"], json!(1));
    assert_eq!(body["limit"], json!(null));
    assert_eq!(
        results(&body)[0],
        json!({
            "total_payments": 3,
            "total_recipients": 2,
            "amount_sum": 1750.5,
            "amount_avg": 583.5,
            "amount_max": 1000.0,
            "amount_min": 250.5
        })
    );
}

#[tokio::test]
async fn searches_match_fingerprints_and_schemes() {
    let harness = harness().await;

    let (_, body) = harness.get_json("/recipients/search?q=FERME-gamma").await;
    assert_eq!(column(&body, "id"), [&json!("lu-r1")]);

    let (_, body) = harness
        .get_json("/schemes/search?q=%20Direct%20aids%20")
        .await;
    assert_eq!(column(&body, "scheme"), [&json!("Direct aids")]);
    assert_eq!(results(&body)[0]["total_payments"], json!(3));
    assert_eq!(results(&body)[0]["amount_sum"], json!(1550.5));

    let (status, body) = harness.get_json("/recipients/search?q=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid search: Search string is empty"));
}

#[tokio::test]
async fn csv_output_flattens_lists() {
    let harness = harness().await;
    let response = harness.get("/years?output=csv").await;
    let (status, content_type, text) = read_text(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/csv; charset=utf-8"));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "year,countries,total_payments,total_recipients,amount_sum,amount_avg,amount_max,amount_min"
    );
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("2015,CZ,3,2,1750.5,"), "{}", lines[1]);
}

#[tokio::test]
async fn csv_reuses_the_cached_json_page() {
    let harness = harness().await;
    let (status, json_body) = harness.get_json("/years").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(column(&json_body, "year"), [&json!(2015), &json!(2019)]);

    harness
        .driver()
        .execute_statement("DROP TABLE farmsubsidy")
        .await
        .unwrap();

    let response = harness.get("/years?output=csv").await;
    let (status, _, text) = read_text(response).await;
    assert_eq!(status, StatusCode::OK, "{text}");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("2015,CZ,3,2,1750.5,"), "{}", lines[1]);
    assert!(lines[2].starts_with("2019,LU,3,2,500.25,"), "{}", lines[2]);
}

#[tokio::test]
async fn exports_are_written_once_per_query() {
    let harness = harness().await;
    let (status, body) = harness
        .get_json_with("/countries?output=export", &[AUTHENTICATED])
        .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["item_count"], json!(2));
    let url = body["export_url"].as_str().expect("export url");
    assert!(url.starts_with("http://api.test/exports/"), "{url}");
    assert!(url.ends_with(".csv"), "{url}");

    let file_name = url.rsplit('/').next().expect("file name");
    let contents = std::fs::read_to_string(harness.export_dir().join(file_name))
        .expect("export file should exist");
    assert!(contents.starts_with("country,"), "{contents}");
    assert_eq!(contents.lines().count(), 3);

    let (_, again) = harness
        .get_json_with("/countries?output=export", &[AUTHENTICATED])
        .await;
    assert_eq!(again["export_url"], body["export_url"]);
}
