//! Inline HTML pages.

use crate::pipeline::ViewPage;

const STYLE: &str = r#"
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            min-height: 100vh;
            padding: 40px 20px;
        }

        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.15);
            max-width: 900px;
            margin: 0 auto;
            padding: 40px;
        }

        h1 {
            color: #333;
            margin-bottom: 20px;
            font-size: 2em;
        }

        .upload-form {
            border: 3px dashed #667eea;
            border-radius: 15px;
            padding: 30px 20px;
            text-align: center;
            background: #f8f9ff;
            margin-bottom: 30px;
        }

        .upload-form button {
            background: #667eea;
            color: white;
            border: none;
            border-radius: 20px;
            padding: 8px 20px;
            font-weight: 600;
            cursor: pointer;
        }

        .gallery {
            list-style: none;
            display: grid;
            grid-template-columns: repeat(auto-fill, minmax(200px, 1fr));
            gap: 10px;
        }

        .gallery a {
            display: block;
            padding: 12px 16px;
            border-radius: 10px;
            background: #f8f9ff;
            color: #667eea;
            text-decoration: none;
            word-break: break-all;
        }

        .empty {
            color: #999;
        }

        .preview-image {
            max-width: 100%;
            border-radius: 10px;
            margin-bottom: 20px;
            box-shadow: 0 4px 15px rgba(0,0,0,0.1);
        }

        .description {
            color: #333;
            font-size: 1.1em;
            line-height: 1.6;
            margin-bottom: 20px;
        }
"#;

fn page(title: &str, bg_color: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body style="background: {bg_color};">
    <div class="container">
{body}
    </div>
</body>
</html>
"#,
        title = escape(title),
        bg_color = escape(bg_color),
    )
}

pub fn render_index(images: &[String], bg_color: &str) -> String {
    let items = if images.is_empty() {
        r#"        <p class="empty">No images uploaded yet.</p>"#.to_string()
    } else {
        let links: String = images
            .iter()
            .map(|name| {
                format!(
                    "            <li><a href=\"{}\">{}</a></li>\n",
                    escape(&view_location(name)),
                    escape(name)
                )
            })
            .collect();
        format!("        <ul class=\"gallery\">\n{links}        </ul>")
    };

    let body = format!(
        r#"        <h1>Image Gallery</h1>
        <form class="upload-form" action="/upload" method="post" enctype="multipart/form-data">
            <input type="file" name="image" accept="image/jpeg">
            <button type="submit">Upload</button>
        </form>
{items}"#
    );
    page("Image Gallery", bg_color, &body)
}

pub fn render_view(view: &ViewPage, bg_color: &str) -> String {
    let body = format!(
        r#"        <h1>{title}</h1>
        <img class="preview-image" src="{url}" alt="{title}">
        <p class="description">{description}</p>
        <a href="/">Back to gallery</a>"#,
        title = escape(&view.title),
        url = escape(view.image_url.as_str()),
        description = escape(&view.description),
    );
    page(&view.title, bg_color, &body)
}

/// Relative URL of the view page for `filename`.
pub fn view_location(filename: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!("/view?filename={}", encoded)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
