//! HTML rendering with maud.

use axum::http::StatusCode;
use listing::{Breadcrumb, Entry, ScanResult, API_SEGMENT};
use maud::{html, Markup, PreEscaped, DOCTYPE};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 960px; color: #222; }
h1 { font-size: 1.4rem; }
nav.crumbs a { text-decoration: none; }
nav.crumbs span.sep { color: #999; margin: 0 .3rem; }
table { border-collapse: collapse; width: 100%; }
th, td { text-align: left; padding: .3rem .5rem; border-bottom: 1px solid #eee; }
td.size, td.modified, td.perms { white-space: nowrap; color: #555; font-size: .9rem; }
td.perms { font-family: monospace; }
button.toggle { border: none; background: none; cursor: pointer; width: 1.4rem; }
button.toggle[disabled] { visibility: hidden; }
tr.nested td.name { padding-left: calc(.5rem + var(--depth, 0) * 1.4rem); }
.empty { color: #888; font-style: italic; }
.error { background: #f8d7da; border: 1px solid #f5c6cb; padding: 1.2rem; border-radius: 4px; max-width: 500px; margin: 0 auto; text-align: center; }
.error h1 { color: #721c24; }
"#;

// Rows fetched from the expansion API are inserted below the clicked row.
const SCRIPT: &str = r#"
document.addEventListener('click', async (ev) => {
  const btn = ev.target.closest('button.toggle');
  if (!btn) return;
  const row = btn.closest('tr');
  const depth = Number(row.dataset.depth || 0);
  if (btn.dataset.open === '1') {
    let next = row.nextElementSibling;
    while (next && Number(next.dataset.depth || 0) > depth) {
      const gone = next; next = next.nextElementSibling; gone.remove();
    }
    btn.dataset.open = '0'; btn.textContent = '▸';
    return;
  }
  const res = await fetch(API + '?path=' + btn.dataset.path);
  const body = await res.json();
  if (!body.success) { alert(body.error); return; }
  const entries = body.data.directories.concat(body.data.files);
  let anchor = row;
  for (const e of entries) {
    const tr = document.createElement('tr');
    tr.className = 'nested';
    tr.dataset.depth = depth + 1;
    tr.style.setProperty('--depth', depth + 1);
    const toggle = e.is_directory && !e.is_empty
      ? `<button class="toggle" data-path="${e.url}">▸</button>` : '<button class="toggle" disabled></button>';
    const name = document.createElement('a');
    name.href = e.url + (e.is_directory ? '/' : '');
    name.textContent = e.name + (e.is_directory ? '/' : '');
    tr.innerHTML = `<td class="name">${toggle}<span class="icon"></span> </td>`
      + `<td class="size">${e.size_formatted}</td><td class="modified">${e.modified_formatted}</td>`
      + `<td class="perms">${e.permissions}</td>`;
    tr.querySelector('span.icon').textContent = ICONS[e.icon] || ICONS.file;
    tr.querySelector('td.name').appendChild(name);
    anchor.after(tr); anchor = tr;
  }
  btn.dataset.open = '1'; btn.textContent = '▾';
});
"#;

/// Glyph shown for an entry's icon name.
pub fn icon_glyph(icon: &str) -> &'static str {
    match icon {
        "folder" => "📁",
        "code" => "📜",
        "image" => "🖼️",
        "video" => "🎬",
        "audio" => "🎵",
        "archive" => "📦",
        "document" => "📄",
        "text" => "📝",
        "config" => "⚙️",
        "font" => "🔤",
        "exec" => "⚡",
        "web" => "🌐",
        "presentation" => "📊",
        "spreadsheet" => "📈",
        "database" => "🗄️",
        "cad" => "📐",
        "ebook" => "📚",
        "game" => "🎮",
        _ => "📃",
    }
}

const ICON_NAMES: &[&str] = &[
    "folder", "code", "image", "video", "audio", "archive", "document", "text", "config", "font",
    "exec", "web", "presentation", "spreadsheet", "database", "cad", "ebook", "game", "file",
];

fn icon_table_js() -> String {
    let pairs: Vec<String> = ICON_NAMES
        .iter()
        .map(|name| format!("{:?}: {:?}", name, icon_glyph(name)))
        .collect();
    format!(
        "const ICONS = {{{}}}; const API = '/{}/api';",
        pairs.join(", "),
        API_SEGMENT
    )
}

fn head(title: &str) -> Markup {
    html! {
        head {
            meta charset="UTF-8";
            meta name="viewport" content="width=device-width, initial-scale=1.0";
            title { (title) }
            style { (PreEscaped(STYLE)) }
        }
    }
}

fn entry_row(entry: &Entry) -> Markup {
    let href = if entry.is_directory {
        format!("{}/", entry.url.trim_end_matches('/'))
    } else {
        entry.url.clone()
    };

    html! {
        tr data-depth="0" {
            td.name {
                @if entry.is_directory && !entry.is_empty {
                    button.toggle data-path=(entry.url) title="Expand" { "▸" }
                } @else {
                    button.toggle disabled {}
                }
                span.icon title=(entry.type_label) { (icon_glyph(entry.icon)) }
                " "
                a href=(href) {
                    (entry.name)
                    @if entry.is_directory { "/" }
                }
                @if entry.is_directory && entry.is_empty {
                    " " span.empty { "(empty)" }
                }
            }
            td.size { (entry.size_formatted) }
            td.modified { (entry.modified_formatted) }
            td.perms { (entry.permissions) }
        }
    }
}

/// Full listing page for one directory.
pub fn listing_page(title: &str, result: &ScanResult, crumbs: &[Breadcrumb]) -> Markup {
    let parent_url = if crumbs.len() >= 2 {
        Some(crumbs[crumbs.len() - 2].url.clone())
    } else {
        None
    };
    let heading = crumbs.last().map(|c| c.name.as_str()).unwrap_or(title);

    html! {
        (DOCTYPE)
        html lang="en" {
            (head(&format!("{} - {}", heading, title)))
            body {
                h1 { (title) }
                nav.crumbs {
                    @for (i, crumb) in crumbs.iter().enumerate() {
                        @if i > 0 { span.sep { "/" } }
                        a href=(crumb.url) { (crumb.name) }
                    }
                }
                table {
                    thead {
                        tr {
                            th { "Name" }
                            th { "Size" }
                            th { "Modified" }
                            th { "Permissions" }
                        }
                    }
                    tbody {
                        @if let Some(url) = parent_url {
                            tr data-depth="0" {
                                td.name {
                                    button.toggle disabled {}
                                    span.icon { "⬆️" }
                                    " "
                                    a href=(url) { ".." }
                                }
                                td {} td {} td {}
                            }
                        }
                        @for entry in &result.directories { (entry_row(entry)) }
                        @for entry in &result.files { (entry_row(entry)) }
                        @if result.directories.is_empty() && result.files.is_empty() {
                            tr { td.empty colspan="4" { "This directory is empty." } }
                        }
                    }
                }
                script { (PreEscaped(icon_table_js())) (PreEscaped(SCRIPT)) }
            }
        }
    }
}

/// Error page for a failed listing.
pub fn error_page(title: &str, status: StatusCode, message: &str) -> Markup {
    let reason = status.canonical_reason().unwrap_or("Error");
    html! {
        (DOCTYPE)
        html lang="en" {
            (head(&format!("{} - {}", reason, title)))
            body {
                div.error {
                    h1 { (status.as_u16()) " " (reason) }
                    p { (message) }
                    p { a href="/" { "Back to the top" } }
                }
            }
        }
    }
}

/// Minimal page returned to rejected clients.
pub fn denied_page(message: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            (head("Access Denied"))
            body {
                div.error {
                    h1 { "Access Denied" }
                    p { (message) }
                    p { "If you believe this is an error, please contact the administrator." }
                }
            }
        }
    }
}
