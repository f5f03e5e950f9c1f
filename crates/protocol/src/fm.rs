//! File-manager menu-provider interface constants.
//!
//! The file manager exposes one object implementing the menu-provider
//! interface. Extensions register themselves once, then react to
//! `ItemsAdded` broadcasts by inserting menu items, and receive
//! `MenuItemActivated` when the user picks one of their entries.

/// Interface implemented by the file manager's menu-provider object.
pub const MENU_PROVIDER_INTERFACE: &str = "org.example.FileManager.MenuProvider";

/// Object path of the menu-provider object.
pub const MENU_PROVIDER_PATH: &str = "/org/example/FileManager/MenuProvider";

/// `RegisterProvider(provider_id: string) -> ()`
///
/// One-time announcement that this extension contributes menu items.
/// There is no unregister call; registration lives as long as the bus
/// connection.
pub const REGISTER_PROVIDER: &str = "RegisterProvider";

/// `AddMenuItem(action_id: string, label: string, attrs: map<string,string>) -> ()`
///
/// Inserts a transient menu item into the menu currently under
/// construction. The action id is minted by the caller and must be
/// unique for the lifetime of the session.
pub const ADD_MENU_ITEM: &str = "AddMenuItem";

/// `ItemsAdded(uris: array<string>)`
///
/// Broadcast while the file manager builds a context menu for the
/// current selection.
pub const ITEMS_ADDED: &str = "ItemsAdded";

/// `MenuItemActivated(action_id: string)`
///
/// Fired when the user selects a contributed entry. Delivered with the
/// action id as the first argument, so listeners scope their
/// subscription by arg0.
pub const MENU_ITEM_ACTIVATED: &str = "MenuItemActivated";

/// Attribute key for the static icon hint passed to `AddMenuItem`.
pub const ATTR_ICON_NAME: &str = "icon-name";

/// Attribute key for the target URI passed to `AddMenuItem`.
pub const ATTR_URI: &str = "uri";
