use std::path::Path;

use gtk4::prelude::*;
use gtk4::{gio, Align, Application, ApplicationWindow, Box as GtkBox, Button, Label, Orientation};

use crate::config::{ImageSource, ViewerConfig};
use crate::ui::ViewerOverlay;

const APP_ID: &str = "com.pictor.ImageViewer";

pub struct PictorApp {
    app: Application,
}

impl PictorApp {
    pub fn new() -> Self {
        let app = Application::builder()
            .application_id(APP_ID)
            .flags(gio::ApplicationFlags::HANDLES_OPEN)
            .build();

        app.connect_activate(Self::on_activate);
        app.connect_open(Self::on_open);

        Self { app }
    }

    pub fn run(&self) -> i32 {
        self.app.run().into()
    }

    fn on_activate(app: &Application) {
        Self::build_window(app, Vec::new());
    }

    fn on_open(app: &Application, files: &[gio::File], _hint: &str) {
        let images = files
            .iter()
            .filter_map(|f| f.path())
            .map(|path| {
                let alt = Self::display_name(&path);
                ImageSource::new(path, alt)
            })
            .collect();
        Self::build_window(app, images);
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn build_window(app: &Application, images: Vec<ImageSource>) {
        let window = ApplicationWindow::builder()
            .application(app)
            .title("pictor")
            .default_width(1280)
            .default_height(860)
            .build();

        let count = images.len();
        let config = ViewerConfig {
            images,
            ..Default::default()
        };
        let viewer = ViewerOverlay::new(config);

        let content = GtkBox::new(Orientation::Vertical, 12);
        content.set_halign(Align::Center);
        content.set_valign(Align::Center);
        let hint = if count == 0 {
            "No images given; pass file paths on the command line.".to_string()
        } else {
            format!("{} image(s) loaded.", count)
        };
        content.append(&Label::new(Some(&hint)));
        let open_btn = Button::with_label("Open viewer");
        {
            let viewer = viewer.clone();
            open_btn.connect_clicked(move |_| {
                viewer.set_visible(true);
            });
        }
        content.append(&open_btn);

        let root = gtk4::Overlay::new();
        root.set_child(Some(&content));
        root.add_overlay(&viewer.widget());
        window.set_child(Some(&root));

        viewer.connect_close({
            let viewer = viewer.clone();
            move || viewer.set_visible(false)
        });
        viewer.connect_mask_click({
            let viewer = viewer.clone();
            move || viewer.set_visible(false)
        });
        viewer.connect_change(|image, index| {
            tracing::info!(index, alt = %image.alt, "Viewer moved to image");
        });

        // Keep the transform centered when the window is resized.
        {
            let viewer = viewer.clone();
            window.connect_default_width_notify(move |_| viewer.notify_resize());
        }
        {
            let viewer = viewer.clone();
            window.connect_default_height_notify(move |_| viewer.notify_resize());
        }

        {
            let viewer = viewer.clone();
            window.connect_close_request(move |_| {
                viewer.teardown();
                gtk4::glib::Propagation::Proceed
            });
        }

        window.present();
        // Keep the window alive by storing it on the Application.
        unsafe {
            app.set_data("main-window", window);
        }
    }
}

impl Default for PictorApp {
    fn default() -> Self {
        Self::new()
    }
}
