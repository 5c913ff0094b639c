diesel::table! {
    cache (url) {
        url -> Text,
        data -> Text,
        created_at -> Double,
        flagged -> Bool,
    }
}
