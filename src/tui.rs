//! Terminal output macros shared by the module binaries.
//!
//! Every macro takes the message plus the `greppable` and `accessible` flags.
//! Greppable mode suppresses all of them, accessible mode drops the colored
//! prefix so screen readers only get the text.

/// Prints a `[!]` line, in red unless accessible mode is on.
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        println!("{} {}", ansi_term::Colour::Red.bold().paint("[!]"), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        // if not greppable then print, otherwise no else statement so do not print.
        if !$greppable {
            if $accessible {
                println!("[!] {}", $name);
            } else {
                println!("{} {}", ansi_term::Colour::Red.bold().paint("[!]"), $name);
            }
        }
    };
}

/// Prints a `[*]` status line.
#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        println!("{} {}", ansi_term::Colour::Blue.bold().paint("[*]"), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("[*] {}", $name);
            } else {
                println!("{} {}", ansi_term::Colour::Blue.bold().paint("[*]"), $name);
            }
        }
    };
}

/// Prints a `[+]` success line.
#[macro_export]
macro_rules! output {
    ($name:expr) => {
        println!("{} {}", ansi_term::Colour::Green.bold().paint("[+]"), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("[+] {}", $name);
            } else {
                println!("{} {}", ansi_term::Colour::Green.bold().paint("[+]"), $name);
            }
        }
    };
}

/// Prints a `[-]` negative-result line.
#[macro_export]
macro_rules! failure {
    ($name:expr) => {
        println!("{} {}", ansi_term::Colour::Yellow.bold().paint("[-]"), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("[-] {}", $name);
            } else {
                println!("{} {}", ansi_term::Colour::Yellow.bold().paint("[-]"), $name);
            }
        }
    };
}

/// Prints the `=====` rule used to frame module output.
#[macro_export]
macro_rules! rule {
    ($width:expr, $greppable:expr) => {
        if !$greppable {
            println!("{}", "=".repeat($width));
        }
    };
}
