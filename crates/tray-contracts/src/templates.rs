use serde::Serialize;

use crate::menu::Category;

pub const STANDARD_TEMPLATE_ID: &str = "standard";
pub const COMPACT_TEMPLATE_ID: &str = "compact";

/// Pixel rectangle on the 1200x800 tray canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraySection {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub max_items: usize,
    pub position: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrayTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub sections: &'static [TraySection],
}

impl TrayTemplate {
    pub fn positions(&self) -> impl Iterator<Item = Rect> + '_ {
        self.sections.iter().map(|section| section.position)
    }

    pub fn capacity(&self) -> usize {
        self.sections.len()
    }
}

pub const STANDARD_TEMPLATE: TrayTemplate = TrayTemplate {
    id: STANDARD_TEMPLATE_ID,
    name: "Standard tray",
    description: "Typical school cafeteria layout",
    sections: &[
        TraySection {
            id: "main",
            name: "Main dish",
            category: Category::Main,
            max_items: 1,
            position: Rect::new(100, 100, 300, 200),
        },
        TraySection {
            id: "side1",
            name: "Side dish 1",
            category: Category::Side,
            max_items: 2,
            position: Rect::new(450, 100, 250, 200),
        },
        TraySection {
            id: "side2",
            name: "Side dish 2",
            category: Category::Side,
            max_items: 2,
            position: Rect::new(100, 350, 250, 150),
        },
        TraySection {
            id: "soup",
            name: "Soup",
            category: Category::Soup,
            max_items: 1,
            position: Rect::new(450, 350, 250, 150),
        },
        TraySection {
            id: "dessert",
            name: "Dessert",
            category: Category::Dessert,
            max_items: 1,
            position: Rect::new(100, 550, 600, 120),
        },
    ],
};

pub const COMPACT_TEMPLATE: TrayTemplate = TrayTemplate {
    id: COMPACT_TEMPLATE_ID,
    name: "Compact tray",
    description: "Small layout for short menus",
    sections: &[
        TraySection {
            id: "main",
            name: "Main dish",
            category: Category::Main,
            max_items: 1,
            position: Rect::new(100, 100, 400, 300),
        },
        TraySection {
            id: "side",
            name: "Side dishes",
            category: Category::Side,
            max_items: 3,
            position: Rect::new(100, 450, 600, 250),
        },
    ],
};

pub const TRAY_TEMPLATES: &[TrayTemplate] = &[STANDARD_TEMPLATE, COMPACT_TEMPLATE];

/// `standard` by id; every other id lays out as `compact`.
pub fn resolve_template(template_id: &str) -> &'static TrayTemplate {
    if template_id.trim() == STANDARD_TEMPLATE_ID {
        &STANDARD_TEMPLATE
    } else {
        &COMPACT_TEMPLATE
    }
}
