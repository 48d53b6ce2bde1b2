use crate::{FieldRule, FieldSpec, Locator, Schema, Transform};

/// The seven-field schema for trade-show listing cards.
pub fn trade_show_schema() -> Schema {
    let title_link = || Locator::css("p[class*='body1R'] a");

    let fields = vec![
        FieldSpec::rule("name", FieldRule::text(title_link())).titled("Event Name"),
        FieldSpec::rule("date", FieldRule::text(Locator::css("p[class*='Body5R']")))
            .titled("Date"),
        FieldSpec::rule(
            "description",
            FieldRule::text(Locator::css(
                "a[href*='/tradeshows/'] span[class*='Body4R']",
            ))
            .then(Transform::StripTruncationMarker),
        )
        .titled("Description"),
        FieldSpec::composite(
            "location",
            vec![
                FieldRule::text(Locator::css("a[href*='/venue/']")),
                FieldRule::text(Locator::css("span[class*='cityCountry']")),
            ],
            ", ",
        )
        .titled("Location"),
        FieldSpec::rule(
            "tags",
            FieldRule::text(Locator::css(
                "a[class*='btn-tag-item'], span[class*='btn-tag-item']",
            ))
            .all(),
        )
        .titled("Tags"),
        FieldSpec::rule("event_url", FieldRule::href(title_link())).titled("Event URL"),
        FieldSpec::rule(
            "organizer_url",
            FieldRule::href(Locator::css("a").with_descendant_text("p", "Website")),
        )
        .titled("Organizer Website"),
    ];

    Schema::builtin(fields)
}
