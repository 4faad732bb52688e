//! Bundled sample templates.
//!
//! `registry_extract_template` is what `docket sample-template` writes out; the
//! smaller ones exist for tests and quick experiments.

/// Registry extract: cover sheet, applicant block, registry table and a
/// "page X of Y" footer.
pub fn registry_extract_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Registry extract {{short_id}}</title>
<style>
    body { font-family: "DejaVu Sans", sans-serif; font-size: 11pt; }
    table.registry { width: 100%; border-collapse: collapse; }
    table.registry th, table.registry td { border: 1px solid #444; padding: 4px; }
    .cover { text-align: center; margin-top: 40%; }
    .page-break { page-break-after: always; }
    footer { position: fixed; bottom: 0; width: 100%; text-align: right; font-size: 9pt; }
</style>
</head>
<body>
{{#if is_draft}}<p class="watermark">DRAFT</p>{{/if}}
<section class="cover">
    <h1>Registry extract</h1>
    <p>Request {{short_id}} of {{creation_date}}</p>
    <p>Total: {{pages_display}}</p>
    <p class="page-break"></p>
</section>

<section class="applicant">
    <p><b>Applicant:</b> {{applicant_info}}</p>
    {{#if is_organization}}
    <p><b>Represented by:</b> {{organization_agent_info}}</p>
    {{/if}}
    <p><b>Contact:</b> {{email}} {{phone}}</p>
    <p><b>Purpose:</b> {{purpose}}</p>
    <p><b>Holder:</b> {{storage_organization}}</p>
</section>

<table class="registry">
    <tr>
        <th>No.</th>
        <th>Id</th>
        <th>Name</th>
        <th>Inventory no.</th>
        <th>Date</th>
        <th>Note</th>
    </tr>
    {{#each registry_items}}
    <tr>
        <td>{{number}}</td>
        <td>{{id}}</td>
        <td>{{name}}</td>
        <td>{{inv_number}}</td>
        <td>{{information_date}}</td>
        <td>{{note}}</td>
    </tr>
    {{/each}}
</table>
<p>Items listed: {{registry_count}}. The extract runs to {{pages_count}} {{pages_word}}.</p>

<footer>Page <span data-field="PAGE">1</span> of <span data-field="NUMPAGES">{{pages}}</span></footer>
</body>
</html>
"##
}

/// One line with the display text; no footer, no breaks.
pub fn minimal_template() -> &'static str {
    "<p>{{applicant_info}}: {{pages_display}}</p>\n"
}

/// Cover plus `extra_breaks` explicit page breaks inside paragraphs and a
/// footer whose page-number field is left empty.
pub fn breaks_template(extra_breaks: usize) -> String {
    let mut html = String::from(
        "<html><body>\n<p>{{applicant_info}}</p>\n<p style=\"page-break-after: always\"></p>\n",
    );
    for i in 0..extra_breaks {
        html.push_str(&format!(
            "<table><tr><td>section {i}<span class=\"break-after\"></span></td></tr></table>\n"
        ));
    }
    html.push_str("<p>{{pages_display}}</p>\n<footer>Page <span data-field=\"PAGE\">1</span></footer>\n</body></html>\n");
    html
}
