// SPDX-License-Identifier: Apache-2.0

use serde_json::json;

use crate::{ErrorKind, Template, TemplateSet};

fn render(src: &str, view: serde_json::Value) -> String {
    let mut set = TemplateSet::new();
    set.add("t", src).unwrap();
    set.render("t", &view).unwrap()
}

fn render_err(src: &str, view: serde_json::Value) -> String {
    let mut set = TemplateSet::new();
    let e = match set.add("t", src) {
        Ok(()) => set.render("t", &view).unwrap_err(),
        Err(e) => e,
    };
    assert_eq!(e.kind(), ErrorKind::RenderError);
    e.msg().to_string()
}

#[test]
fn test_template_for_block_lines() {
    let out = render(
        "servers:\n{% for s in servers %}\n  - {{ s }}\n{% endfor %}\ndone\n",
        json!({"servers": ["a", "b"]}),
    );
    assert_eq!(out, "servers:\n  - a\n  - b\ndone\n");
}

#[test]
fn test_template_indented_block_tags() {
    let out = render(
        "table {\n    {% for r in rules %}\n    {{ r }}\n    {% endfor %}\n}\n",
        json!({"rules": ["accept", "drop"]}),
    );
    assert_eq!(out, "table {\n    accept\n    drop\n}\n");
}

#[test]
fn test_template_if_elif_else() {
    let src = "{% if mode == \"a\" %}A{% elif not flag %}B{% else %}C{% endif %}\n";
    assert_eq!(render(src, json!({"mode": "a"})), "A");
    assert_eq!(render(src, json!({"mode": "b"})), "B");
    assert_eq!(render(src, json!({"mode": "b", "flag": {}})), "C");
}

#[test]
fn test_template_conditions() {
    let view = json!({
        "names": ["eth0", "eth1"],
        "mtu": "1500",
        "empty": [],
    });
    assert_eq!(
        render("{% if \"eth0\" in names and mtu == 1500 %}yes{% endif %}", view.clone()),
        "yes"
    );
    assert_eq!(
        render("{% if empty or missing %}yes{% else %}no{% endif %}", view.clone()),
        "no"
    );
    assert_eq!(
        render("{% if mtu != \"9000\" %}std{% endif %}", view),
        "std"
    );
}

#[test]
fn test_template_filters() {
    let view = json!({"names": ["a", "b"], "name": "Lan", "nothing": null});
    assert_eq!(render("{{ names | join(\", \") }}", view.clone()), "a, b");
    assert_eq!(render("{{ names | length }}", view.clone()), "2");
    assert_eq!(render("{{ name | upper }}/{{ name | lower }}", view.clone()), "LAN/lan");
    assert_eq!(render("{{ missing | default(\"none\") }}", view.clone()), "none");
    assert_eq!(render("{{ nothing | default(7) }}", view.clone()), "7");
    assert_eq!(render("[{{ nothing }}]", view), "[]");
}

#[test]
fn test_template_map_loop() {
    let out = render(
        "{% for k, v in m %}{{ k }}={{ v }}{% if not loop.last %},{% endif %}{% endfor %}",
        json!({"m": {"b": 1, "a": 2}}),
    );
    assert_eq!(out, "b=1,a=2");
    let out = render(
        "{% for s in seq %}{{ loop.index }}:{{ s.name }} {% endfor %}",
        json!({"seq": [{"name": "x"}, {"name": "y"}]}),
    );
    assert_eq!(out, "1:x 2:y ");
}

#[test]
fn test_template_include_and_comment() {
    let mut set = TemplateSet::new();
    set.add("header", "# generated\n").unwrap();
    set.add("main", "{% include \"header\" %}\n{# skip me #}\nbody\n")
        .unwrap();
    assert_eq!(set.render("main", &json!({})).unwrap(), "# generated\nbody\n");
    assert!(set.contains("header"));

    let e = set.render("absent", &json!({})).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::RenderError);
    assert_eq!(e.msg(), "Template absent does not exist");
}

#[test]
fn test_template_render_errors() {
    assert_eq!(
        render_err("a\n{{ nope }}\n", json!({})),
        "Template t line 2: undefined value 'nope'"
    );
    assert_eq!(
        render_err("{{ m }}", json!({"m": {"k": 1}})),
        "Template t line 1: cannot print non scalar value 'm'"
    );
    assert_eq!(
        render_err("{% for x in s %}{% endfor %}", json!({"s": 3})),
        "Template t line 1: 's' is not iterable"
    );
    assert_eq!(
        render_err("{% include \"other\" %}", json!({})),
        "Template t line 1: included template other does not exist"
    );
}

#[test]
fn test_template_parse_errors() {
    assert_eq!(
        render_err("abc {{ x", json!({})),
        "Template t line 1: unterminated tag, expecting '}}'"
    );
    assert_eq!(
        render_err("\n{% if a %}x", json!({})),
        "Template t line 2: unclosed if block"
    );
    assert_eq!(
        render_err("{% while a %}{% endwhile %}", json!({})),
        "Template t line 1: unknown statement 'while'"
    );
    assert_eq!(
        render_err("{% endif %}", json!({})),
        "Template t line 1: unexpected EndIf statement"
    );
    assert!(Template::parse("t", "{% for in x %}{% endfor %}").is_err());
}

#[test]
fn test_template_lenient_conditions() {
    assert_eq!(
        render("{% if a.b.c %}x{% endif %}{% for i in none %}y{% endfor %}", json!({})),
        ""
    );
}
